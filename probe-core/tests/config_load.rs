use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use probe_core::load_from_path;

fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos();
    std::env::temp_dir().join(format!("probe-toolkit-{nanos}-{name}.toml"))
}

#[test]
fn loads_an_empty_file_as_all_defaults() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("empty");
    fs::write(&path, "")?;

    let cfg = load_from_path(&path)?;
    assert_eq!(cfg.ping.count, 4);
    assert_eq!(cfg.ping.timeout_ms, 2000);
    assert_eq!(cfg.scan.port_lo, 1);
    assert_eq!(cfg.scan.port_hi, 1024);
    assert_eq!(cfg.scan.concurrency, 256);
    assert_eq!(cfg.logging.level, "info");
    Ok(())
}

#[test]
fn loads_partial_overrides_and_keeps_remaining_defaults() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("partial");
    let toml = r#"
[ping]
count = 10
timeout_ms = 5000

[scan]
port_lo = 20
port_hi = 8080

[logging]
level = "debug"
"#;
    fs::write(&path, toml)?;

    let cfg = load_from_path(&path)?;
    assert_eq!(cfg.ping.count, 10);
    assert_eq!(cfg.ping.timeout_ms, 5000);
    assert_eq!(cfg.ping.interval_ms, 1000, "untouched field keeps its default");
    assert_eq!(cfg.scan.port_lo, 20);
    assert_eq!(cfg.scan.port_hi, 8080);
    assert_eq!(cfg.scan.concurrency, 256, "untouched field keeps its default");
    assert_eq!(cfg.logging.level, "debug");
    assert!(!cfg.logging.show_target);
    Ok(())
}

#[test]
fn rejects_a_scan_range_that_would_fail_validation() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("bad-range");
    fs::write(&path, "[scan]\nport_lo = 9000\nport_hi = 80\n")?;

    assert!(load_from_path(&path).is_err());
    Ok(())
}

#[test]
fn rejects_a_ping_timeout_shorter_than_its_interval() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("bad-ping");
    fs::write(&path, "[ping]\ntimeout_ms = 200\ninterval_ms = 900\n")?;

    assert!(load_from_path(&path).is_err());
    Ok(())
}

#[test]
fn missing_file_is_reported_as_invalid_config() {
    let err = load_from_path("/nonexistent/probe-toolkit/config.toml").unwrap_err();
    assert!(matches!(err, probe_core::ProbeError::InvalidConfig(_)));
}
