//! TCP option encoding/decoding (RFC 793/1323/2018), with 4-byte alignment
//! padding on encode.

use crate::error::{ProbeError, Result};

/// A single SACK range: `[left_edge, right_edge)` in sequence-number space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SackRange {
    pub left_edge: u32,
    pub right_edge: u32,
}

impl SackRange {
    pub fn new(left_edge: u32, right_edge: u32) -> Result<Self> {
        if left_edge > right_edge {
            return Err(ProbeError::Encode("SACK left edge must be <= right edge".into()));
        }
        Ok(Self { left_edge, right_edge })
    }
}

/// A decoded/pre-encode TCP option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpOption {
    EndOfList,
    Nop,
    Mss(u16),
    WindowScale(u8),
    SackPermitted,
    Sack(Vec<SackRange>),
    Timestamp { ts_val: u32, ts_ecr: u32 },
    Unknown { kind: u8, value: Vec<u8> },
}

impl TcpOption {
    fn kind(&self) -> u8 {
        match self {
            TcpOption::EndOfList => 0,
            TcpOption::Nop => 1,
            TcpOption::Mss(_) => 2,
            TcpOption::WindowScale(_) => 3,
            TcpOption::SackPermitted => 4,
            TcpOption::Sack(_) => 5,
            TcpOption::Timestamp { .. } => 8,
            TcpOption::Unknown { kind, .. } => *kind,
        }
    }

    /// On-wire length in bytes, including kind/length bytes where present.
    fn encoded_len(&self) -> usize {
        match self {
            TcpOption::EndOfList | TcpOption::Nop => 1,
            TcpOption::Mss(_) => 4,
            TcpOption::WindowScale(_) => 3,
            TcpOption::SackPermitted => 2,
            TcpOption::Sack(ranges) => 2 + 8 * ranges.len(),
            TcpOption::Timestamp { .. } => 10,
            TcpOption::Unknown { value, .. } => 2 + value.len(),
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            TcpOption::EndOfList => out.push(0),
            TcpOption::Nop => out.push(1),
            TcpOption::Mss(mss) => {
                out.push(2);
                out.push(4);
                out.extend_from_slice(&mss.to_be_bytes());
            }
            TcpOption::WindowScale(shift) => {
                out.push(3);
                out.push(3);
                out.push(*shift);
            }
            TcpOption::SackPermitted => {
                out.push(4);
                out.push(2);
            }
            TcpOption::Sack(ranges) => {
                out.push(5);
                out.push((2 + 8 * ranges.len()) as u8);
                for range in ranges {
                    out.extend_from_slice(&range.left_edge.to_be_bytes());
                    out.extend_from_slice(&range.right_edge.to_be_bytes());
                }
            }
            TcpOption::Timestamp { ts_val, ts_ecr } => {
                out.push(8);
                out.push(10);
                out.extend_from_slice(&ts_val.to_be_bytes());
                out.extend_from_slice(&ts_ecr.to_be_bytes());
            }
            TcpOption::Unknown { kind, value } => {
                out.push(*kind);
                out.push((2 + value.len()) as u8);
                out.extend_from_slice(value);
            }
        }
    }
}

/// Encodes a sequence of options, prefixing each option that doesn't already
/// land on a 4-byte boundary with enough NOPs to align it.
///
/// Returns the padded option block; caller derives `data_offset` from its
/// length (`(20 + block.len()) / 4`).
pub fn encode_options(options: &[TcpOption]) -> Vec<u8> {
    let mut out = Vec::new();
    for option in options {
        let width = option.encoded_len();
        let padding = width.div_ceil(4) * 4 - width;
        for _ in 0..padding {
            TcpOption::Nop.encode_into(&mut out);
        }
        option.encode_into(&mut out);
    }
    out
}

/// Decodes a raw options block as found on the wire (already padded).
///
/// Stops at `kind == 0` (End of List) or when the declared length would
/// overshoot the remaining bytes, in which case `MalformedFrame` is
/// returned (the frame is discarded by the matcher, never
/// fatal"). Unknown kinds are preserved as opaque bytes.
pub fn decode_options(mut bytes: &[u8]) -> Result<Vec<TcpOption>> {
    let mut options = Vec::new();
    while let Some((&kind, rest)) = bytes.split_first() {
        match kind {
            0 => {
                options.push(TcpOption::EndOfList);
                break;
            }
            1 => {
                options.push(TcpOption::Nop);
                bytes = rest;
            }
            _ => {
                let (&len, data) = rest
                    .split_first()
                    .ok_or_else(|| ProbeError::MalformedFrame("truncated option length".into()))?;
                let len = len as usize;
                if len < 2 {
                    return Err(ProbeError::MalformedFrame(format!(
                        "option kind {kind} has length {len} < 2"
                    )));
                }
                let value_len = len - 2;
                let value = data.get(..value_len).ok_or_else(|| {
                    ProbeError::MalformedFrame(format!(
                        "option kind {kind} declares length {len} past end of options"
                    ))
                })?;
                options.push(decode_known(kind, value)?);
                bytes = &data[value_len..];
            }
        }
    }
    Ok(options)
}

fn decode_known(kind: u8, value: &[u8]) -> Result<TcpOption> {
    match kind {
        2 => {
            let bytes: [u8; 2] = value
                .try_into()
                .map_err(|_| ProbeError::MalformedFrame("MSS option value must be 2 bytes".into()))?;
            Ok(TcpOption::Mss(u16::from_be_bytes(bytes)))
        }
        3 => {
            let &[shift] = value else {
                return Err(ProbeError::MalformedFrame("window scale option value must be 1 byte".into()));
            };
            Ok(TcpOption::WindowScale(shift))
        }
        4 => {
            if !value.is_empty() {
                return Err(ProbeError::MalformedFrame("SACK-permitted option carries no value".into()));
            }
            Ok(TcpOption::SackPermitted)
        }
        5 => {
            if value.len() % 8 != 0 {
                return Err(ProbeError::MalformedFrame("SACK option value must be a multiple of 8 bytes".into()));
            }
            let ranges = value
                .chunks_exact(8)
                .map(|chunk| {
                    let left = u32::from_be_bytes(chunk[0..4].try_into().unwrap());
                    let right = u32::from_be_bytes(chunk[4..8].try_into().unwrap());
                    SackRange::new(left, right)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(TcpOption::Sack(ranges))
        }
        8 => {
            let bytes: [u8; 8] = value
                .try_into()
                .map_err(|_| ProbeError::MalformedFrame("timestamp option value must be 8 bytes".into()))?;
            let ts_val = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
            let ts_ecr = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
            Ok(TcpOption::Timestamp { ts_val, ts_ecr })
        }
        other => Ok(TcpOption::Unknown { kind: other, value: value.to_vec() }),
    }
}
