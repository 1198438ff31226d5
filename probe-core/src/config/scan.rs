use std::time::Duration;

use serde::Deserialize;

use crate::scan::PortRange;

/// Scan configuration: defaults for a `probe scan` run.
#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Lowest port in the scanned range, inclusive.
    /// Default: 1.
    #[serde(default = "default_port_lo")]
    pub port_lo: u16,
    /// Highest port in the scanned range, inclusive.
    /// Default: 1024.
    #[serde(default = "default_port_hi")]
    pub port_hi: u16,
    /// Per-handshake timeout in milliseconds.
    /// Default: 1000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum handshakes in flight at once.
    /// Default: 256.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port_lo: default_port_lo(),
            port_hi: default_port_hi(),
            timeout_ms: default_timeout_ms(),
            concurrency: default_concurrency(),
        }
    }
}

impl ScanConfig {
    pub fn port_range(&self) -> PortRange {
        PortRange { lo: self.port_lo, hi: self.port_hi }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_port_lo() -> u16 {
    1
}

fn default_port_hi() -> u16 {
    1024
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    256
}
