//! ICMP ping manager: sequenced echo requests with per-destination
//! stats and optional verbose per-probe reporting.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::correlator::{Correlator, Probe, ProbeKind, ProbeResult};
use crate::error::{ProbeError, Result};
use crate::icmp::IcmpEcho;
use crate::net::{send_frame, RawSocket};

/// Validated parameters for a ping run.
#[derive(Debug, Clone, Copy)]
pub struct PingOptions {
    pub timeout: Duration,
    pub interval: Duration,
    pub count: u32,
    pub verbose: bool,
}

impl PingOptions {
    pub fn validate(&self) -> Result<()> {
        if self.count < 1 {
            return Err(ProbeError::InvalidConfig("count must be >= 1".into()));
        }
        if self.timeout < self.interval {
            return Err(ProbeError::InvalidConfig("timeout must be >= interval".into()));
        }
        Ok(())
    }
}

/// Per-destination aggregate stats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingStats {
    pub sent: u32,
    pub received: u32,
    pub loss_pct: f64,
    pub success: bool,
}

impl PingStats {
    fn finish(sent: u32, received: u32) -> Self {
        let loss_pct = if sent == 0 { 0.0 } else { 100.0 * f64::from(sent - received) / f64::from(sent) };
        Self { sent, received, loss_pct, success: received > 0 }
    }
}

/// One iteration's outcome, surfaced only when `verbose` is set.
#[derive(Debug, Clone, Copy)]
pub struct PingOutcome {
    pub sequence: u16,
    pub result: ProbeResult,
    pub elapsed: Duration,
}

static IDENTIFIER_COUNTER: AtomicU16 = AtomicU16::new(1);

/// Drives ICMP echo probes against one or many destinations, sharing a raw
/// ICMP socket, a correlator, and a global semaphore bounding in-flight
/// probes across every destination in a multi-destination run.
pub struct Ping {
    socket: Arc<dyn RawSocket>,
    correlator: Correlator,
    semaphore: Arc<Semaphore>,
}

impl Ping {
    pub fn new(socket: Arc<dyn RawSocket>, correlator: Correlator, max_in_flight: usize) -> Self {
        Self { socket, correlator, semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))) }
    }

    /// Pings a single destination, returning its aggregate stats and, if
    /// `verbose`, the per-iteration outcomes in send order.
    pub async fn run(&self, dst: Ipv4Addr, options: PingOptions) -> Result<(PingStats, Vec<PingOutcome>)> {
        options.validate()?;
        let identifier = IDENTIFIER_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut sent = 0u32;
        let mut received = 0u32;
        let mut outcomes = Vec::new();

        for sequence in 0..options.count as u16 {
            let _permit = self.semaphore.acquire().await.expect("semaphore never closed");

            let echo = IcmpEcho { reply: false, code: 0, identifier, sequence, payload: vec![0u8; 32] };
            let encoded = echo.encode();
            sent += 1;
            let start = Instant::now();

            let probe = Probe::new(
                std::net::IpAddr::V4(dst),
                ProbeKind::Icmp { identifier, sequence },
                options.timeout,
            );
            let (id, rx) = self.correlator.register(probe);

            if let Err(err) = send_frame(&*self.socket, encoded, dst).await {
                warn!(%dst, %err, "failed to submit ICMP echo request");
                self.correlator.forget(id);
                if options.verbose {
                    outcomes.push(PingOutcome { sequence, result: ProbeResult::Timeout, elapsed: start.elapsed() });
                }
                tokio::time::sleep(options.interval).await;
                continue;
            }

            let result = tokio::select! {
                received = rx => received.unwrap_or(ProbeResult::Timeout),
                _ = tokio::time::sleep(options.timeout) => {
                    self.correlator.expire(id);
                    ProbeResult::Timeout
                }
            };
            let elapsed = start.elapsed();

            if matches!(result, ProbeResult::EchoReply) {
                received += 1;
            }
            if options.verbose {
                info!(%dst, sequence, ?result, ?elapsed, "ping reply");
                outcomes.push(PingOutcome { sequence, result, elapsed });
            }

            tokio::time::sleep(options.interval).await;
        }

        Ok((PingStats::finish(sent, received), outcomes))
    }

    /// Pings every destination concurrently, one task per destination, and
    /// gathers the results keyed by destination.
    pub async fn run_many(
        self: Arc<Self>,
        destinations: Vec<Ipv4Addr>,
        options: PingOptions,
    ) -> Result<HashMap<Ipv4Addr, PingStats>> {
        options.validate()?;
        let mut tasks = Vec::with_capacity(destinations.len());
        for dst in destinations {
            let this = self.clone();
            tasks.push(tokio::spawn(async move { (dst, this.run(dst, options).await) }));
        }

        let mut results = HashMap::with_capacity(tasks.len());
        for task in tasks {
            let (dst, outcome) = task.await.map_err(|e| ProbeError::Io(std::io::Error::other(e.to_string())))?;
            let (stats, _outcomes) = outcome?;
            results.insert(dst, stats);
        }
        Ok(results)
    }
}
