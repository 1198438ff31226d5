use std::time::Duration;

use serde::Deserialize;

use crate::ping::PingOptions;

/// Ping configuration: the defaults a `probe ping` run falls back
/// to when a flag isn't given on the command line.
#[derive(Debug, Deserialize, Clone)]
pub struct PingConfig {
    /// Per-echo reply timeout in milliseconds.
    /// Default: 2000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Delay between successive echoes, in milliseconds.
    /// Default: 1000.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Number of echoes to send per destination.
    /// Default: 4.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Report every echo's outcome, not just the aggregate.
    /// Default: false.
    #[serde(default)]
    pub verbose: bool,
    /// Upper bound on probes in flight at once across all destinations.
    /// Default: 64.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            interval_ms: default_interval_ms(),
            count: default_count(),
            verbose: false,
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl PingConfig {
    pub fn to_options(&self) -> PingOptions {
        PingOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            interval: Duration::from_millis(self.interval_ms),
            count: self.count,
            verbose: self.verbose,
        }
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_count() -> u32 {
    4
}

fn default_max_in_flight() -> usize {
    64
}
