//! Response matcher chain: a fixed-order list of matcher closures over
//! a tagged inbound-frame enum, re-expressing the chain-of-responsibility
//! pattern without mutable "next" pointers.

use std::net::Ipv4Addr;

use crate::icmp::{IcmpError, ECHO_REPLY_TYPE};
use crate::ipv4::Ipv4Header;
use crate::tcp::{TcpFlags, TcpHeader, TcpOption};

use super::probe::{Probe, ProbeKind, ProbeResult};

/// A decoded inbound frame, reduced to exactly what the matcher chain needs.
pub enum InboundFrame {
    IcmpEchoReply { remote_ip: Ipv4Addr, identifier: u16, sequence: u16 },
    IcmpDestUnreachable { code: u8, quoted_identifier: u16, quoted_sequence: u16 },
    IcmpRedirect { quoted_identifier: u16, quoted_sequence: u16 },
    IcmpTimeExceeded { quoted_identifier: u16, quoted_sequence: u16 },
    IcmpParamProblem { quoted_identifier: u16, quoted_sequence: u16 },
    Tcp {
        remote_ip: Ipv4Addr,
        remote_port: u16,
        local_ip: Ipv4Addr,
        local_port: u16,
        flags: TcpFlags,
        sequence_number: u32,
        options: Vec<TcpOption>,
    },
}

/// Recovers the `(identifier, sequence)` of the originally transmitted ICMP
/// echo quoted inside an ICMP error message's payload (offending IP header
/// plus at least 8 bytes of the echo header): the quoted prefix is how the
/// error is tied back to the outstanding probe.
fn quoted_echo_ids(quoted: &[u8]) -> Option<(u16, u16)> {
    let (_ip, rest) = Ipv4Header::decode(quoted).ok()?;
    if rest.len() < 8 {
        return None;
    }
    let identifier = u16::from_be_bytes([rest[4], rest[5]]);
    let sequence = u16::from_be_bytes([rest[6], rest[7]]);
    Some((identifier, sequence))
}

/// Builds an [`InboundFrame`] from a decoded IPv4 header and its payload
/// (the L4 header plus data), or `None` if the frame is of no interest to
/// the correlator (e.g. an ICMP type this toolkit never probes for).
pub fn classify(ip: &Ipv4Header, l4: &[u8]) -> Option<InboundFrame> {
    use crate::ipv4::IpProtocol;

    match ip.protocol {
        IpProtocol::Icmp => {
            let message_type = *l4.first()?;
            if message_type == ECHO_REPLY_TYPE {
                let echo = crate::icmp::IcmpEcho::decode(l4).ok()?;
                Some(InboundFrame::IcmpEchoReply {
                    remote_ip: ip.source,
                    identifier: echo.identifier,
                    sequence: echo.sequence,
                })
            } else if IcmpError::is_error_type(message_type) {
                let error = IcmpError::decode(l4).ok()?;
                let (identifier, sequence) = quoted_echo_ids(&error.quoted)?;
                Some(match error.message_type {
                    crate::icmp::DESTINATION_UNREACHABLE_TYPE => InboundFrame::IcmpDestUnreachable {
                        code: error.code,
                        quoted_identifier: identifier,
                        quoted_sequence: sequence,
                    },
                    crate::icmp::REDIRECT_TYPE => {
                        InboundFrame::IcmpRedirect { quoted_identifier: identifier, quoted_sequence: sequence }
                    }
                    crate::icmp::TIME_EXCEEDED_TYPE => {
                        InboundFrame::IcmpTimeExceeded { quoted_identifier: identifier, quoted_sequence: sequence }
                    }
                    crate::icmp::PARAMETER_PROBLEM_TYPE => {
                        InboundFrame::IcmpParamProblem { quoted_identifier: identifier, quoted_sequence: sequence }
                    }
                    _ => return None,
                })
            } else {
                None
            }
        }
        IpProtocol::Tcp => {
            let (tcp, _payload) = TcpHeader::decode(l4).ok()?;
            Some(InboundFrame::Tcp {
                remote_ip: ip.source,
                remote_port: tcp.source_port,
                local_ip: ip.destination,
                local_port: tcp.destination_port,
                flags: tcp.flags,
                sequence_number: tcp.sequence_number,
                options: tcp.options,
            })
        }
        IpProtocol::Other(_) => None,
    }
}

type Matcher = fn(&InboundFrame, &Probe) -> Option<ProbeResult>;

const CHAIN: &[Matcher] = &[match_icmp_echo_reply, match_icmp_error, match_tcp];

/// Runs `frame` through the fixed-order matcher chain, returning the result
/// of the first matcher that claims it. `probes` is scanned in the order
/// given; the caller is responsible for removing a claimed probe from the
/// registry so later-arriving duplicates for it are ignored.
pub fn first_match<'p>(
    frame: &InboundFrame,
    probes: impl Iterator<Item = &'p Probe>,
) -> Option<(&'p Probe, ProbeResult)> {
    for probe in probes {
        for matcher in CHAIN {
            if let Some(result) = matcher(frame, probe) {
                return Some((probe, result));
            }
        }
    }
    None
}

fn match_icmp_echo_reply(frame: &InboundFrame, probe: &Probe) -> Option<ProbeResult> {
    let ProbeKind::Icmp { identifier, sequence } = probe.kind else { return None };
    match frame {
        InboundFrame::IcmpEchoReply { remote_ip, identifier: fid, sequence: fseq }
            if probe.dst == std::net::IpAddr::V4(*remote_ip) && *fid == identifier && *fseq == sequence =>
        {
            Some(ProbeResult::EchoReply)
        }
        _ => None,
    }
}

fn match_icmp_error(frame: &InboundFrame, probe: &Probe) -> Option<ProbeResult> {
    let ProbeKind::Icmp { identifier, sequence } = probe.kind else { return None };
    let (quoted_identifier, quoted_sequence, result) = match frame {
        InboundFrame::IcmpDestUnreachable { code, quoted_identifier, quoted_sequence } => {
            (*quoted_identifier, *quoted_sequence, ProbeResult::DestUnreachable(*code))
        }
        InboundFrame::IcmpRedirect { quoted_identifier, quoted_sequence } => {
            (*quoted_identifier, *quoted_sequence, ProbeResult::Redirect)
        }
        InboundFrame::IcmpTimeExceeded { quoted_identifier, quoted_sequence } => {
            (*quoted_identifier, *quoted_sequence, ProbeResult::TimeExceeded)
        }
        InboundFrame::IcmpParamProblem { quoted_identifier, quoted_sequence } => {
            (*quoted_identifier, *quoted_sequence, ProbeResult::ParamProblem)
        }
        _ => return None,
    };
    (quoted_identifier == identifier && quoted_sequence == sequence).then_some(result)
}

fn match_tcp(frame: &InboundFrame, probe: &Probe) -> Option<ProbeResult> {
    let ProbeKind::TcpSyn { src_ip, src_port, dst_port } = probe.kind else { return None };
    let InboundFrame::Tcp { remote_ip, remote_port, local_ip, local_port, flags, sequence_number, options } = frame
    else {
        return None;
    };
    let matches_flow = probe.dst == std::net::IpAddr::V4(*remote_ip)
        && *remote_port == dst_port
        && *local_ip == src_ip
        && *local_port == src_port;
    if !matches_flow {
        return None;
    }
    if flags.contains(TcpFlags::SYN) && flags.contains(TcpFlags::ACK) {
        let remote_mss = options.iter().find_map(|opt| match opt {
            TcpOption::Mss(mss) => Some(*mss),
            _ => None,
        });
        Some(ProbeResult::TcpSynAck { remote_seq: *sequence_number, remote_mss })
    } else if flags.contains(TcpFlags::RST) {
        Some(ProbeResult::TcpRstAck)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn icmp_probe(dst: Ipv4Addr, identifier: u16, sequence: u16) -> Probe {
        Probe::new(std::net::IpAddr::V4(dst), ProbeKind::Icmp { identifier, sequence }, Duration::from_secs(1))
    }

    #[test]
    fn echo_reply_matches_on_identifier_sequence_and_source() {
        let probe = icmp_probe(Ipv4Addr::new(8, 8, 8, 8), 42, 7);
        let frame = InboundFrame::IcmpEchoReply { remote_ip: Ipv4Addr::new(8, 8, 8, 8), identifier: 42, sequence: 7 };
        let probes = vec![probe];
        let (matched, result) = first_match(&frame, probes.iter()).unwrap();
        assert_eq!(matched.id, probes[0].id);
        assert_eq!(result, ProbeResult::EchoReply);
    }

    #[test]
    fn echo_reply_does_not_match_different_sequence() {
        let probe = icmp_probe(Ipv4Addr::new(8, 8, 8, 8), 42, 7);
        let frame = InboundFrame::IcmpEchoReply { remote_ip: Ipv4Addr::new(8, 8, 8, 8), identifier: 42, sequence: 8 };
        assert!(first_match(&frame, std::iter::once(&probe)).is_none());
    }

    #[test]
    fn dest_unreachable_matches_via_quoted_identifiers() {
        let probe = icmp_probe(Ipv4Addr::new(1, 1, 1, 1), 99, 3);
        let frame = InboundFrame::IcmpDestUnreachable { code: 1, quoted_identifier: 99, quoted_sequence: 3 };
        let (_, result) = first_match(&frame, std::iter::once(&probe)).unwrap();
        assert_eq!(result, ProbeResult::DestUnreachable(1));
    }

    #[test]
    fn tcp_syn_ack_matches_four_tuple() {
        let probe = Probe::new(
            std::net::IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
            ProbeKind::TcpSyn { src_ip: Ipv4Addr::new(10, 0, 0, 5), src_port: 54321, dst_port: 443 },
            Duration::from_secs(1),
        );
        let frame = InboundFrame::Tcp {
            remote_ip: Ipv4Addr::new(93, 184, 216, 34),
            remote_port: 443,
            local_ip: Ipv4Addr::new(10, 0, 0, 5),
            local_port: 54321,
            flags: TcpFlags::SYN | TcpFlags::ACK,
            sequence_number: 0xABCD_EF01,
            options: vec![TcpOption::Mss(1460)],
        };
        let (_, result) = first_match(&frame, std::iter::once(&probe)).unwrap();
        assert_eq!(result, ProbeResult::TcpSynAck { remote_seq: 0xABCD_EF01, remote_mss: Some(1460) });
    }

    #[test]
    fn tcp_rst_resolves_as_reset() {
        let probe = Probe::new(
            std::net::IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
            ProbeKind::TcpSyn { src_ip: Ipv4Addr::new(10, 0, 0, 5), src_port: 54321, dst_port: 443 },
            Duration::from_secs(1),
        );
        let frame = InboundFrame::Tcp {
            remote_ip: Ipv4Addr::new(93, 184, 216, 34),
            remote_port: 443,
            local_ip: Ipv4Addr::new(10, 0, 0, 5),
            local_port: 54321,
            flags: TcpFlags::RST | TcpFlags::ACK,
            sequence_number: 0,
            options: vec![],
        };
        let (_, result) = first_match(&frame, std::iter::once(&probe)).unwrap();
        assert_eq!(result, ProbeResult::TcpRstAck);
    }

    #[test]
    fn unclaimed_frame_yields_no_match() {
        let probe = icmp_probe(Ipv4Addr::new(8, 8, 8, 8), 1, 1);
        let frame = InboundFrame::Tcp {
            remote_ip: Ipv4Addr::new(8, 8, 8, 8),
            remote_port: 80,
            local_ip: Ipv4Addr::new(10, 0, 0, 1),
            local_port: 1111,
            flags: TcpFlags::SYN,
            sequence_number: 0,
            options: vec![],
        };
        assert!(first_match(&frame, std::iter::once(&probe)).is_none());
    }
}
