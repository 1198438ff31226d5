//! TCP SYN half-open scanner: drives one flow per `(dst, port)` pair
//! under a bounded semaphore, aggregating which ports answered SYN+ACK.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::correlator::{Correlator, ProbeResult};
use crate::error::{ProbeError, Result};
use crate::firewall::FirewallGuard;
use crate::flow::{FlowAddr, TcpFlow};
use crate::net::RawSocket;

/// `[lo, hi]` inclusive port range, validated against `1..=65535`.
#[derive(Debug, Clone, Copy)]
pub struct PortRange {
    pub lo: u16,
    pub hi: u16,
}

impl PortRange {
    pub fn validate(&self) -> Result<()> {
        if self.lo == 0 || self.lo > self.hi {
            return Err(ProbeError::InvalidConfig(format!(
                "port range [{}, {}] must satisfy 1 <= lo <= hi <= 65535",
                self.lo, self.hi
            )));
        }
        Ok(())
    }

    fn ports(&self) -> impl Iterator<Item = u16> + Clone {
        self.lo..=self.hi
    }
}

/// `dst -> { port -> open }`, only ports that answered SYN+ACK are present.
pub type ScanReport = HashMap<Ipv4Addr, HashMap<u16, bool>>;

static EPHEMERAL_SRC_PORT: AtomicU16 = AtomicU16::new(40000);

fn next_src_port() -> u16 {
    let port = EPHEMERAL_SRC_PORT.fetch_add(1, Ordering::Relaxed);
    if port == 0 {
        EPHEMERAL_SRC_PORT.store(40000, Ordering::Relaxed);
        40000
    } else {
        port
    }
}

/// Runs a half-open SYN scan across the Cartesian product of `destinations`
/// and `ports`, at most `concurrency` handshakes in flight at once.
///
/// `correlator` must be the same instance a receiver loop is already
/// dispatching inbound frames from `socket` into, the same wiring `Ping`
/// requires of its caller — `scan` only registers probes and waits on them.
pub async fn scan(
    socket: Arc<dyn RawSocket>,
    correlator: Correlator,
    src_ip: Ipv4Addr,
    destinations: &[Ipv4Addr],
    ports: PortRange,
    timeout: Duration,
    concurrency: usize,
) -> Result<ScanReport> {
    ports.validate()?;
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    // Assign one ephemeral source port per (dst, port) pair up front, so
    // the firewall guard can be installed for exactly the ports the flows
    // will actually use before any of them start sending.
    let assignments: Vec<(Ipv4Addr, u16, u16)> = destinations
        .iter()
        .flat_map(|&dst| ports.ports().map(move |port| (dst, port, next_src_port())))
        .collect();
    let src_ports: Vec<u16> = assignments.iter().map(|(_, _, src_port)| *src_port).collect();
    let firewall = FirewallGuard::acquire(&src_ports).await;

    let mut tasks = Vec::new();
    for (dst, port, src_port) in assignments {
        let socket = socket.clone();
        let correlator = correlator.clone();
        let semaphore = semaphore.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let addr = FlowAddr { src_ip, src_port, dst_ip: dst, dst_port: port };
            let mut flow = TcpFlow::new(addr, socket, correlator, 1_000_000 + u32::from(port), port, timeout);
            let result = flow.handshake().await;
            flow.force_close();
            (dst, port, result)
        }));
    }

    let mut report: ScanReport = HashMap::new();
    for task in tasks {
        match task.await {
            Ok((dst, port, Ok(ProbeResult::TcpSynAck { .. }))) => {
                debug!(%dst, port, "open");
                report.entry(dst).or_default().insert(port, true);
            }
            Ok((dst, port, Ok(other))) => {
                debug!(%dst, port, ?other, "not open");
            }
            Ok((dst, port, Err(err))) => {
                warn!(%dst, port, %err, "flow error during scan");
            }
            Err(join_err) => {
                warn!(%join_err, "scan task panicked");
            }
        }
    }

    firewall.release().await;
    Ok(report)
}
