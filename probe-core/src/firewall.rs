//! Firewall guard: scoped installation/removal of the OS-level rule
//! that suppresses the kernel's own RST on source ports the scanner owns.
//! Raw sockets bypass the kernel's TCP state machine, so the kernel — which
//! never saw the SYN leave through a real socket — responds to an inbound
//! SYN+ACK with its own RST unless this filter is in place.

use std::collections::BTreeSet;

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::Result;

/// A scan-scoped set of `iptables OUTPUT` rules dropping outbound RST
/// packets whose source port is one this scan is using. Acquired once per
/// scan (not per flow, per the source's `tcp_scanner.py::complete_scan`
/// wrapping the whole scan rather than per-port open/close), and released
/// on every exit path.
pub struct FirewallGuard {
    installed_ports: BTreeSet<u16>,
}

impl FirewallGuard {
    /// Installs a DROP rule for each port in `ports` that doesn't already
    /// have one. Idempotent: re-acquiring with an overlapping port set only
    /// adds what's missing.
    pub async fn acquire(ports: &[u16]) -> Self {
        let mut installed = BTreeSet::new();
        for &port in ports {
            if rule_exists(port).await {
                info!(port, "RST-suppression rule already present");
                installed.insert(port);
                continue;
            }
            match add_rule(port).await {
                Ok(()) => {
                    info!(port, "installed RST-suppression rule");
                    installed.insert(port);
                }
                Err(err) => warn!(port, %err, "failed to install RST-suppression rule"),
            }
        }
        Self { installed_ports: installed }
    }

    /// Removes exactly the rules this guard added. Best-effort: failures
    /// are logged, never propagated, so cleanup of the remaining ports
    /// still proceeds.
    pub async fn release(mut self) {
        for port in std::mem::take(&mut self.installed_ports) {
            if let Err(err) = remove_rule(port).await {
                warn!(port, %err, "failed to remove RST-suppression rule");
            } else {
                info!(port, "removed RST-suppression rule");
            }
        }
    }
}

impl Drop for FirewallGuard {
    fn drop(&mut self) {
        if !self.installed_ports.is_empty() {
            warn!(
                remaining = self.installed_ports.len(),
                "FirewallGuard dropped without release(); rules may still be installed"
            );
        }
    }
}

fn rst_drop_args(action: &str, port: u16) -> Vec<String> {
    vec![
        action.to_string(),
        "OUTPUT".to_string(),
        "-p".to_string(),
        "tcp".to_string(),
        "--tcp-flags".to_string(),
        "RST".to_string(),
        "RST".to_string(),
        "--sport".to_string(),
        port.to_string(),
        "-j".to_string(),
        "DROP".to_string(),
    ]
}

async fn rule_exists(port: u16) -> bool {
    Command::new("iptables")
        .args(rst_drop_args("-C", port))
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

async fn add_rule(port: u16) -> Result<()> {
    run_iptables(rst_drop_args("-A", port)).await
}

async fn remove_rule(port: u16) -> Result<()> {
    run_iptables(rst_drop_args("-D", port)).await
}

async fn run_iptables(args: Vec<String>) -> Result<()> {
    let status = Command::new("iptables").args(&args).status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(crate::error::ProbeError::Permission(format!(
            "iptables exited with {status}: {}",
            args.join(" ")
        )))
    }
}
