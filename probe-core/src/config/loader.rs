use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{ProbeError, Result};
use crate::scan::PortRange;

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| ProbeError::InvalidConfig(format!("failed to read config file: {e}")))?;
    let cfg: Config =
        toml::from_str(&txt).map_err(|e| ProbeError::InvalidConfig(format!("failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    cfg.ping.to_options().validate()?;
    PortRange { lo: cfg.scan.port_lo, hi: cfg.scan.port_hi }.validate()?;
    if cfg.scan.concurrency == 0 {
        return Err(ProbeError::InvalidConfig("scan.concurrency must be >= 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_loads_all_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "").unwrap();
        let cfg = load_from_path(file.path()).unwrap();
        assert_eq!(cfg.ping.count, 4);
        assert_eq!(cfg.scan.port_hi, 1024);
    }

    #[test]
    fn rejects_inverted_scan_port_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[scan]\nport_lo = 1024\nport_hi = 1\n").unwrap();
        assert!(load_from_path(file.path()).is_err());
    }

    #[test]
    fn rejects_ping_timeout_shorter_than_interval() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[ping]\ntimeout_ms = 100\ninterval_ms = 500\n").unwrap();
        assert!(load_from_path(file.path()).is_err());
    }

    #[test]
    fn missing_file_surfaces_invalid_config() {
        assert!(load_from_path("/nonexistent/path/probe.toml").is_err());
    }
}
