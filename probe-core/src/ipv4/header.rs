//! IPv4 header encoding/decoding (RFC 791).

use std::net::Ipv4Addr;

use bitflags::bitflags;

use crate::checksum::checksum;
use crate::error::{ProbeError, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ipv4Flags: u8 {
        const DONT_FRAGMENT = 0b010;
        const MORE_FRAGMENTS = 0b001;
    }
}

/// IPv4 `protocol` field values this crate crafts or recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Other(u8),
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            1 => IpProtocol::Icmp,
            6 => IpProtocol::Tcp,
            other => IpProtocol::Other(other),
        }
    }
}

impl From<IpProtocol> for u8 {
    fn from(value: IpProtocol) -> Self {
        match value {
            IpProtocol::Icmp => 1,
            IpProtocol::Tcp => 6,
            IpProtocol::Other(other) => other,
        }
    }
}

pub const FIXED_HEADER_LEN: usize = 20;

/// A built or parsed IPv4 header. `options` is raw bytes (rarely used by
/// this toolkit, but preserved for round-tripping).
#[derive(Debug, Clone, PartialEq)]
pub struct Ipv4Header {
    pub ihl: u8,
    pub dscp: u8,
    pub ecn: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags: Ipv4Flags,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: IpProtocol,
    pub checksum: Option<u16>,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub options: Vec<u8>,
}

impl Ipv4Header {
    /// Builds the 20+ byte IPv4 header. `l4_and_payload_len` is the
    /// combined length of everything that follows the IP header;
    /// `total_length` is derived and validated against the 65535 byte cap.
    pub fn encode(&self, l4_and_payload_len: usize) -> Result<Vec<u8>> {
        if !(5..=15).contains(&self.ihl) {
            return Err(ProbeError::Encode(format!("IHL {} out of range [5,15]", self.ihl)));
        }
        if self.dscp > 0x3F {
            return Err(ProbeError::Encode(format!("DSCP {} out of range [0,63]", self.dscp)));
        }
        if self.ecn > 0x3 {
            return Err(ProbeError::Encode(format!("ECN {} out of range [0,3]", self.ecn)));
        }
        if self.fragment_offset > 0x1FFF {
            return Err(ProbeError::Encode(format!(
                "fragment_offset {} out of range [0,8191]",
                self.fragment_offset
            )));
        }
        let header_len = self.ihl as usize * 4;
        let total_length = header_len + l4_and_payload_len;
        if total_length > 0xFFFF {
            return Err(ProbeError::Encode(format!("total_length {total_length} exceeds 65535")));
        }

        let mut out = Vec::with_capacity(header_len);
        out.push((4 << 4) | self.ihl);
        out.push((self.dscp << 2) | self.ecn);
        out.extend_from_slice(&(total_length as u16).to_be_bytes());
        out.extend_from_slice(&self.identification.to_be_bytes());
        let flags_and_frag = (u16::from(self.flags.bits()) << 13) | self.fragment_offset;
        out.extend_from_slice(&flags_and_frag.to_be_bytes());
        out.push(self.ttl);
        out.push(self.protocol.into());
        out.extend_from_slice(&[0, 0]); // checksum placeholder
        out.extend_from_slice(&self.source.octets());
        out.extend_from_slice(&self.destination.octets());
        out.extend_from_slice(&self.options);
        // Pad options to the declared IHL if the caller under-supplied them.
        out.resize(header_len, 0);

        let sum = match self.checksum {
            Some(supplied) => supplied,
            None => checksum(&out[..header_len]),
        };
        out[10] = (sum >> 8) as u8;
        out[11] = (sum & 0xFF) as u8;

        Ok(out)
    }

    /// Parses an IPv4 header, returning the header view and the remaining
    /// bytes (the L4 header + payload).
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8])> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(ProbeError::MalformedFrame("frame shorter than IPv4 fixed header".into()));
        }
        let version = bytes[0] >> 4;
        if version != 4 {
            return Err(ProbeError::MalformedFrame(format!("unsupported IP version {version}")));
        }
        let ihl = bytes[0] & 0x0F;
        let header_len = ihl as usize * 4;
        if header_len < FIXED_HEADER_LEN {
            return Err(ProbeError::MalformedFrame(format!("IHL {ihl} below minimum of 5")));
        }
        let dscp = bytes[1] >> 2;
        let ecn = bytes[1] & 0x3;
        let total_length = u16::from_be_bytes([bytes[2], bytes[3]]);
        let identification = u16::from_be_bytes([bytes[4], bytes[5]]);
        let flags_and_frag = u16::from_be_bytes([bytes[6], bytes[7]]);
        let flags = Ipv4Flags::from_bits_truncate((flags_and_frag >> 13) as u8);
        let fragment_offset = flags_and_frag & 0x1FFF;
        let ttl = bytes[8];
        let protocol = IpProtocol::from(bytes[9]);
        let checksum_field = u16::from_be_bytes([bytes[10], bytes[11]]);
        let source = Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]);
        let destination = Ipv4Addr::new(bytes[16], bytes[17], bytes[18], bytes[19]);
        let rest = bytes
            .get(FIXED_HEADER_LEN..header_len)
            .ok_or_else(|| ProbeError::MalformedFrame("IHL extends past frame".into()))?;
        let payload = bytes
            .get(header_len..)
            .ok_or_else(|| ProbeError::MalformedFrame("IHL extends past frame".into()))?;

        Ok((
            Self {
                ihl,
                dscp,
                ecn,
                total_length,
                identification,
                flags,
                fragment_offset,
                ttl,
                protocol,
                checksum: Some(checksum_field),
                source,
                destination,
                options: rest.to_vec(),
            },
            payload,
        ))
    }

    pub fn header_length(&self) -> usize {
        self.ihl as usize * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Ipv4Header {
        Ipv4Header {
            ihl: 5,
            dscp: 0,
            ecn: 0,
            total_length: 0,
            identification: 0,
            flags: Ipv4Flags::empty(),
            fragment_offset: 0,
            ttl: 64,
            protocol: IpProtocol::Tcp,
            checksum: None,
            source: Ipv4Addr::new(192, 168, 1, 1),
            destination: Ipv4Addr::new(192, 168, 1, 2),
            options: vec![],
        }
    }

    #[test]
    fn s4_defaults_round_trip() {
        let header = base();
        let encoded = header.encode(20).unwrap();
        let (parsed, _payload) = Ipv4Header::decode(&encoded).unwrap();
        assert_eq!(parsed.ihl, 5);
        assert_eq!(parsed.header_length(), 20);
        assert_eq!(parsed.dscp, 0);
        assert_eq!(parsed.ecn, 0);
        assert_eq!(parsed.total_length, 40);
    }

    #[test]
    fn checksum_verifies_over_ten_words() {
        let header = base();
        let encoded = header.encode(20).unwrap();
        assert_eq!(checksum(&encoded[..FIXED_HEADER_LEN]), 0x0000);
    }

    #[test]
    fn rejects_ihl_out_of_range() {
        let mut header = base();
        header.ihl = 4;
        assert!(header.encode(20).is_err());
        header.ihl = 16;
        assert!(header.encode(20).is_err());
    }

    #[test]
    fn rejects_total_length_overflow() {
        let header = base();
        assert!(header.encode(0xFFFF).is_err());
    }

    #[test]
    fn supplied_checksum_is_used_verbatim() {
        let mut header = base();
        header.checksum = Some(0xBEEF);
        let encoded = header.encode(20).unwrap();
        assert_eq!(u16::from_be_bytes([encoded[10], encoded[11]]), 0xBEEF);
    }

    #[test]
    fn dscp_ecn_split_round_trips() {
        let mut header = base();
        header.dscp = 0x3F;
        header.ecn = 0x3;
        let encoded = header.encode(0).unwrap();
        let (parsed, _) = Ipv4Header::decode(&encoded).unwrap();
        assert_eq!(parsed.dscp, 0x3F);
        assert_eq!(parsed.ecn, 0x3);
    }
}
