//! Builds real wire bytes end to end — IPv4 header, ICMP/TCP payload,
//! checksums — then feeds them back through decode + the correlator's
//! matcher chain, the same path a receiver loop hands inbound frames
//! through in production.

use std::net::Ipv4Addr;
use std::time::Duration;

use probe_core::correlator::{Correlator, Probe, ProbeKind, ProbeResult};
use probe_core::icmp::{IcmpEcho, DESTINATION_UNREACHABLE_TYPE};
use probe_core::ipv4::{IpProtocol, Ipv4Flags, Ipv4Header};
use probe_core::tcp::{TcpFlags, TcpHeader, TcpOption};

fn base_ip_header(protocol: IpProtocol, source: Ipv4Addr, destination: Ipv4Addr) -> Ipv4Header {
    Ipv4Header {
        ihl: 5,
        dscp: 0,
        ecn: 0,
        total_length: 0,
        identification: 4242,
        flags: Ipv4Flags::DONT_FRAGMENT,
        fragment_offset: 0,
        ttl: 58,
        protocol,
        checksum: None,
        source,
        destination,
        options: vec![],
    }
}

#[tokio::test]
async fn icmp_echo_reply_resolves_a_registered_ping_probe() {
    let responder = Ipv4Addr::new(8, 8, 8, 8);
    let us = Ipv4Addr::new(10, 0, 0, 5);

    let echo = IcmpEcho { reply: true, code: 0, identifier: 0x5151, sequence: 3, payload: vec![0xAA; 24] };
    let icmp_bytes = echo.encode();
    let ip = base_ip_header(IpProtocol::Icmp, responder, us);
    let ip_bytes = ip.encode(icmp_bytes.len()).unwrap();

    let frame = [ip_bytes, icmp_bytes].concat();
    let (decoded_ip, payload) = Ipv4Header::decode(&frame).unwrap();

    let correlator = Correlator::new();
    let probe = Probe::new(
        std::net::IpAddr::V4(responder),
        ProbeKind::Icmp { identifier: 0x5151, sequence: 3 },
        Duration::from_secs(1),
    );
    let (_id, rx) = correlator.register(probe);

    correlator.dispatch(&decoded_ip, payload);

    assert_eq!(rx.await.unwrap(), ProbeResult::EchoReply);
    assert_eq!(correlator.outstanding(), 0);
}

#[tokio::test]
async fn icmp_destination_unreachable_quoting_the_probe_resolves_it() {
    let hop = Ipv4Addr::new(192, 0, 2, 1);
    let target = Ipv4Addr::new(203, 0, 113, 7);
    let us = Ipv4Addr::new(10, 0, 0, 5);

    // The datagram we originally sent: an echo request toward `target`.
    let original_echo = IcmpEcho { reply: false, code: 0, identifier: 0x9001, sequence: 12, payload: vec![0u8; 16] };
    let original_echo_bytes = original_echo.encode();
    let original_ip = base_ip_header(IpProtocol::Icmp, us, target);
    let original_ip_bytes = original_ip.encode(original_echo_bytes.len()).unwrap();

    // A router quotes that original IP header plus 8 bytes of payload back
    // inside a Destination Unreachable message.
    let mut icmp_error = vec![DESTINATION_UNREACHABLE_TYPE, 1, 0, 0, 0, 0, 0, 0];
    icmp_error.extend_from_slice(&original_ip_bytes);
    icmp_error.extend_from_slice(&original_echo_bytes[..8]);

    let carrier_ip = base_ip_header(IpProtocol::Icmp, hop, us);
    let carrier_ip_bytes = carrier_ip.encode(icmp_error.len()).unwrap();
    let frame = [carrier_ip_bytes, icmp_error].concat();
    let (decoded_ip, payload) = Ipv4Header::decode(&frame).unwrap();

    let correlator = Correlator::new();
    let probe = Probe::new(
        std::net::IpAddr::V4(target),
        ProbeKind::Icmp { identifier: 0x9001, sequence: 12 },
        Duration::from_secs(1),
    );
    let (_id, rx) = correlator.register(probe);

    correlator.dispatch(&decoded_ip, payload);

    assert_eq!(rx.await.unwrap(), ProbeResult::DestUnreachable(1));
}

#[tokio::test]
async fn tcp_syn_ack_with_mss_option_resolves_a_scan_probe() {
    let us = Ipv4Addr::new(10, 0, 0, 5);
    let target = Ipv4Addr::new(93, 184, 216, 34);

    let tcp = TcpHeader {
        source_port: 443,
        destination_port: 54321,
        sequence_number: 0xDEAD_BEEF,
        acknowledgment_number: 1_000_001,
        reserved: 0,
        flags: TcpFlags::SYN | TcpFlags::ACK,
        window_size: 65535,
        checksum: 0,
        urgent_pointer: 0,
        options: vec![TcpOption::Mss(1460)],
    };
    let tcp_bytes = tcp.encode(target, us, &[]).unwrap();
    let ip = base_ip_header(IpProtocol::Tcp, target, us);
    let ip_bytes = ip.encode(tcp_bytes.len()).unwrap();
    let frame = [ip_bytes, tcp_bytes].concat();
    let (decoded_ip, payload) = Ipv4Header::decode(&frame).unwrap();

    let correlator = Correlator::new();
    let probe = Probe::new(
        std::net::IpAddr::V4(target),
        ProbeKind::TcpSyn { src_ip: us, src_port: 54321, dst_port: 443 },
        Duration::from_secs(1),
    );
    let (_id, rx) = correlator.register(probe);

    correlator.dispatch(&decoded_ip, payload);

    assert_eq!(rx.await.unwrap(), ProbeResult::TcpSynAck { remote_seq: 0xDEAD_BEEF, remote_mss: Some(1460) });
}

#[tokio::test]
async fn tcp_rst_resolves_a_scan_probe_as_closed() {
    let us = Ipv4Addr::new(10, 0, 0, 5);
    let target = Ipv4Addr::new(93, 184, 216, 34);

    let tcp = TcpHeader {
        source_port: 8080,
        destination_port: 60000,
        sequence_number: 0,
        acknowledgment_number: 1,
        reserved: 0,
        flags: TcpFlags::RST | TcpFlags::ACK,
        window_size: 0,
        checksum: 0,
        urgent_pointer: 0,
        options: vec![],
    };
    let tcp_bytes = tcp.encode(target, us, &[]).unwrap();
    let ip = base_ip_header(IpProtocol::Tcp, target, us);
    let ip_bytes = ip.encode(tcp_bytes.len()).unwrap();
    let frame = [ip_bytes, tcp_bytes].concat();
    let (decoded_ip, payload) = Ipv4Header::decode(&frame).unwrap();

    let correlator = Correlator::new();
    let probe = Probe::new(
        std::net::IpAddr::V4(target),
        ProbeKind::TcpSyn { src_ip: us, src_port: 60000, dst_port: 8080 },
        Duration::from_secs(1),
    );
    let (_id, rx) = correlator.register(probe);

    correlator.dispatch(&decoded_ip, payload);

    assert_eq!(rx.await.unwrap(), ProbeResult::TcpRstAck);
}
