//! Packet-crafting and probe-correlation engine behind the `probe` CLI:
//! hand-built IPv4/ICMP/TCP headers over a raw socket, an async
//! probe/response correlator, and the ICMP ping and TCP SYN scan front ends
//! built on top of them.
#![deny(unsafe_code)]

pub mod addr;
pub mod checksum;
pub mod config;
pub mod correlator;
pub mod error;
pub mod firewall;
pub mod flow;
pub mod icmp;
pub mod ipv4;
pub mod net;
pub mod ping;
pub mod scan;
pub mod tcp;
pub mod telemetry;

pub use checksum::checksum;
pub use config::{load_from_path, Config, LoggingConfig, PingConfig, ScanConfig};
pub use correlator::{Correlator, Probe, ProbeId, ProbeKind, ProbeResult};
pub use error::{ProbeError, Result};
pub use firewall::FirewallGuard;
pub use flow::{FlowAddr, FlowState, TcpFlow};
pub use net::{RawIcmp4, RawSocket, RawTcp4};
pub use ping::{Ping, PingOptions, PingOutcome, PingStats};
pub use scan::{scan, PortRange, ScanReport};
