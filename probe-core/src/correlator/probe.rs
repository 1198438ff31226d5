//! The in-flight probe record and its outcome variants.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Unique while the probe is alive; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId(u64);

static NEXT_PROBE_ID: AtomicU64 = AtomicU64::new(1);

impl ProbeId {
    pub fn next() -> Self {
        Self(NEXT_PROBE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a probe is waiting to be matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Icmp { identifier: u16, sequence: u16 },
    TcpSyn { src_ip: Ipv4Addr, src_port: u16, dst_port: u16 },
}

/// How a probe was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    EchoReply,
    DestUnreachable(u8),
    Redirect,
    TimeExceeded,
    ParamProblem,
    /// Carries what the flow controller needs to complete the handshake:
    /// the remote's initial sequence number and, if present, its MSS option.
    TcpSynAck { remote_seq: u32, remote_mss: Option<u16> },
    TcpRstAck,
    Timeout,
}

/// An in-flight request record, as registered with the correlator.
#[derive(Debug, Clone)]
pub struct Probe {
    pub id: ProbeId,
    pub dst: IpAddr,
    pub kind: ProbeKind,
    pub start: Instant,
    pub timeout: Duration,
}

impl Probe {
    pub fn new(dst: IpAddr, kind: ProbeKind, timeout: Duration) -> Self {
        Self { id: ProbeId::next(), dst, kind, start: Instant::now(), timeout }
    }

    pub fn deadline(&self) -> Instant {
        self.start + self.timeout
    }
}
