//! Probe/response correlator: owns the in-flight probe map and resolves
//! probes as the receiver loop hands it classified inbound frames
//! The map is mutated only from the receiver loop's thread of
//! execution, per the concurrency model's single-writer rule.

pub mod matcher;
pub mod probe;

use std::collections::HashMap;
use std::sync::Mutex;

use ahash::RandomState;
use tokio::sync::oneshot;
use tracing::trace;

use crate::ipv4::Ipv4Header;

pub use matcher::{classify, InboundFrame};
pub use probe::{Probe, ProbeId, ProbeKind, ProbeResult};

struct Pending {
    probe: Probe,
    responder: oneshot::Sender<ProbeResult>,
}

/// The shared registry of outstanding probes for one scan/ping instance.
/// Cheap to clone; all clones share the same underlying map.
#[derive(Clone)]
pub struct Correlator {
    pending: std::sync::Arc<Mutex<HashMap<ProbeId, Pending, RandomState>>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self { pending: std::sync::Arc::new(Mutex::new(HashMap::default())) }
    }

    /// Registers a probe and returns a receiver that resolves exactly once,
    /// either via a matched frame or [`Self::expire`].
    pub fn register(&self, probe: Probe) -> (ProbeId, oneshot::Receiver<ProbeResult>) {
        let id = probe.id;
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().expect("probe map mutex poisoned");
        pending.insert(id, Pending { probe, responder: tx });
        (id, rx)
    }

    /// Removes a probe without resolving it (e.g. after the caller itself
    /// already consumed the receiver via [`Self::register`]'s `rx` timing
    /// out on the caller side).
    pub fn forget(&self, id: ProbeId) {
        self.pending.lock().expect("probe map mutex poisoned").remove(&id);
    }

    /// Resolves `id` as [`ProbeResult::Timeout`] if it is still pending.
    /// A no-op if the probe was already resolved by an inbound frame.
    pub fn expire(&self, id: ProbeId) {
        let mut pending = self.pending.lock().expect("probe map mutex poisoned");
        if let Some(entry) = pending.remove(&id) {
            let _ = entry.responder.send(ProbeResult::Timeout);
        }
    }

    /// Classifies `(ip, l4)` and, if it matches an outstanding probe,
    /// resolves and removes that probe. Intended to be called from the
    /// receiver loop's dispatch closure.
    pub fn dispatch(&self, ip: &Ipv4Header, l4: &[u8]) {
        let Some(frame) = classify(ip, l4) else {
            trace!("frame did not classify into any matcher-relevant shape");
            return;
        };
        let mut pending = self.pending.lock().expect("probe map mutex poisoned");
        let claimed_id = {
            let probes = pending.values().map(|p| &p.probe);
            matcher::first_match(&frame, probes).map(|(probe, result)| (probe.id, result))
        };
        if let Some((id, result)) = claimed_id {
            if let Some(entry) = pending.remove(&id) {
                let _ = entry.responder.send(result);
            }
        }
    }

    pub fn outstanding(&self) -> usize {
        self.pending.lock().expect("probe map mutex poisoned").len()
    }
}
