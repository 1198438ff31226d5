use serde::Deserialize;

use super::ping::PingConfig;
use super::scan::ScanConfig;
use super::telemetry::LoggingConfig;

/// Top-level configuration, loaded from a TOML file via [`super::load_from_path`].
/// Every section falls back to its documented defaults when absent, so an
/// empty file is a valid configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ping: PingConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}
