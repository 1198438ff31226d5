//! TCP header encoding/decoding (RFC 9293), including the pseudo-header
//! checksum and option block from [`super::options`].

use std::net::Ipv4Addr;

use bitflags::bitflags;

use super::options::{decode_options, encode_options, TcpOption};
use crate::checksum::checksum;
use crate::error::{ProbeError, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TcpFlags: u16 {
        const FIN = 0x001;
        const SYN = 0x002;
        const RST = 0x004;
        const PSH = 0x008;
        const ACK = 0x010;
        const URG = 0x020;
        const ECE = 0x040;
        const CWR = 0x080;
        const NS  = 0x100;
    }
}

/// A fully-built TCP header, ready to be prefixed with an [`crate::ipv4::Ipv4Header`]
/// and transmitted, or as parsed from a received frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgment_number: u32,
    pub reserved: u8,
    pub flags: TcpFlags,
    pub window_size: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
    pub options: Vec<TcpOption>,
}

pub const FIXED_HEADER_LEN: usize = 20;

impl TcpHeader {
    /// Encodes the header, options, and payload, computing the checksum over
    /// the pseudo-header (`src_ip`, `dst_ip`, zero, protocol=6, TCP length)
    /// followed by the header (checksum zeroed) + options + payload.
    pub fn encode(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr, payload: &[u8]) -> Result<Vec<u8>> {
        let options = encode_options(&self.options);
        let data_offset_words = (FIXED_HEADER_LEN + options.len()) / 4;
        if data_offset_words > 15 {
            return Err(ProbeError::Encode("TCP options too large: data_offset would exceed 15".into()));
        }

        let mut header = Vec::with_capacity(FIXED_HEADER_LEN + options.len());
        header.extend_from_slice(&self.source_port.to_be_bytes());
        header.extend_from_slice(&self.destination_port.to_be_bytes());
        header.extend_from_slice(&self.sequence_number.to_be_bytes());
        header.extend_from_slice(&self.acknowledgment_number.to_be_bytes());
        let offset_reserved_flags =
            ((data_offset_words as u16) << 12) | (u16::from(self.reserved & 0x7) << 9) | self.flags.bits();
        header.extend_from_slice(&offset_reserved_flags.to_be_bytes());
        header.extend_from_slice(&self.window_size.to_be_bytes());
        header.extend_from_slice(&[0, 0]); // checksum placeholder
        header.extend_from_slice(&self.urgent_pointer.to_be_bytes());
        header.extend_from_slice(&options);

        let tcp_len = header.len() + payload.len();
        let mut pseudo_and_segment = Vec::with_capacity(12 + tcp_len);
        pseudo_and_segment.extend_from_slice(&src_ip.octets());
        pseudo_and_segment.extend_from_slice(&dst_ip.octets());
        pseudo_and_segment.push(0x00);
        pseudo_and_segment.push(6); // protocol = TCP
        pseudo_and_segment.extend_from_slice(&(tcp_len as u16).to_be_bytes());
        pseudo_and_segment.extend_from_slice(&header);
        pseudo_and_segment.extend_from_slice(payload);

        let sum = checksum(&pseudo_and_segment);
        header[16] = (sum >> 8) as u8;
        header[17] = (sum & 0xFF) as u8;

        Ok(header)
    }

    /// Parses a TCP segment (header + options; payload is the remainder
    /// beyond `data_offset * 4` and is returned as-is).
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8])> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(ProbeError::MalformedFrame("TCP segment shorter than fixed header".into()));
        }
        let source_port = u16::from_be_bytes([bytes[0], bytes[1]]);
        let destination_port = u16::from_be_bytes([bytes[2], bytes[3]]);
        let sequence_number = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        let acknowledgment_number = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
        let offset_reserved_flags = u16::from_be_bytes([bytes[12], bytes[13]]);
        let data_offset = (offset_reserved_flags >> 12) as usize;
        let reserved = ((offset_reserved_flags >> 9) & 0x7) as u8;
        let flags = TcpFlags::from_bits_truncate(offset_reserved_flags & 0x1FF);
        let window_size = u16::from_be_bytes([bytes[14], bytes[15]]);
        let checksum = u16::from_be_bytes([bytes[16], bytes[17]]);
        let urgent_pointer = u16::from_be_bytes([bytes[18], bytes[19]]);

        if data_offset < 5 {
            return Err(ProbeError::MalformedFrame(format!("data_offset {data_offset} < 5")));
        }
        let header_len = data_offset * 4;
        let options_bytes = bytes
            .get(FIXED_HEADER_LEN..header_len)
            .ok_or_else(|| ProbeError::MalformedFrame("data_offset extends past segment".into()))?;
        let options = decode_options(options_bytes)?;
        let payload = &bytes[header_len..];

        Ok((
            Self {
                source_port,
                destination_port,
                sequence_number,
                acknowledgment_number,
                reserved,
                flags,
                window_size,
                checksum,
                urgent_pointer,
                options,
            },
            payload,
        ))
    }

    pub fn data_offset_words(&self) -> usize {
        (FIXED_HEADER_LEN + encode_options(&self.options).len()) / 4
    }
}
