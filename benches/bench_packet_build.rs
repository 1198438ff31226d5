//! Micro benchmarks for hand-built IPv4/ICMP/TCP packet encoding.
//! Pure CPU — no sockets, no IO.
//!
//! ```bash
//! cargo bench --bench bench_packet_build
//! ```

use std::net::Ipv4Addr;

use criterion::{criterion_group, criterion_main, Criterion};
use probe_core::icmp::IcmpEcho;
use probe_core::ipv4::{IpProtocol, Ipv4Flags, Ipv4Header};
use probe_core::tcp::{TcpFlags, TcpHeader};

fn icmp_echo_request() -> IcmpEcho {
    IcmpEcho { reply: false, code: 0, identifier: 0xBEEF, sequence: 1, payload: vec![0u8; 32] }
}

fn tcp_syn_header() -> TcpHeader {
    TcpHeader {
        source_port: 54321,
        destination_port: 443,
        sequence_number: 1_000_000,
        acknowledgment_number: 0,
        reserved: 0,
        flags: TcpFlags::SYN,
        window_size: 65535,
        checksum: 0,
        urgent_pointer: 0,
        options: vec![],
    }
}

fn ipv4_header(protocol: IpProtocol) -> Ipv4Header {
    Ipv4Header {
        ihl: 5,
        dscp: 0,
        ecn: 0,
        total_length: 0,
        identification: 1,
        flags: Ipv4Flags::DONT_FRAGMENT,
        fragment_offset: 0,
        ttl: 64,
        protocol,
        checksum: None,
        source: Ipv4Addr::new(10, 0, 0, 1),
        destination: Ipv4Addr::new(93, 184, 216, 34),
        options: vec![],
    }
}

fn bench_icmp_echo_encode(c: &mut Criterion) {
    let echo = icmp_echo_request();
    c.bench_function("icmp_echo_encode", |b| {
        b.iter(|| std::hint::black_box(&echo).encode());
    });
}

fn bench_tcp_syn_encode(c: &mut Criterion) {
    let tcp = tcp_syn_header();
    let src = Ipv4Addr::new(10, 0, 0, 1);
    let dst = Ipv4Addr::new(93, 184, 216, 34);
    c.bench_function("tcp_syn_encode", |b| {
        b.iter(|| std::hint::black_box(&tcp).encode(src, dst, &[]).unwrap());
    });
}

fn bench_full_ipv4_tcp_frame(c: &mut Criterion) {
    let tcp = tcp_syn_header();
    let ip = ipv4_header(IpProtocol::Tcp);
    c.bench_function("full_ipv4_tcp_syn_frame", |b| {
        b.iter(|| {
            let tcp_bytes = tcp.encode(ip.source, ip.destination, &[]).unwrap();
            let ip_bytes = std::hint::black_box(&ip).encode(tcp_bytes.len()).unwrap();
            [ip_bytes, tcp_bytes].concat()
        });
    });
}

fn bench_ipv4_decode(c: &mut Criterion) {
    let tcp = tcp_syn_header();
    let ip = ipv4_header(IpProtocol::Tcp);
    let tcp_bytes = tcp.encode(ip.source, ip.destination, &[]).unwrap();
    let ip_bytes = ip.encode(tcp_bytes.len()).unwrap();
    let frame = [ip_bytes, tcp_bytes].concat();
    c.bench_function("ipv4_decode", |b| {
        b.iter(|| Ipv4Header::decode(std::hint::black_box(&frame)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_icmp_echo_encode,
    bench_tcp_syn_encode,
    bench_full_ipv4_tcp_frame,
    bench_ipv4_decode
);
criterion_main!(benches);
