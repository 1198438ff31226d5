#![forbid(unsafe_code)]

use std::net::{Ipv4Addr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use probe_core::addr::parse_ipv4;
use probe_core::{
    load_from_path, scan, Config, Correlator, Ping, PortRange, ProbeError, RawIcmp4, RawTcp4,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Hand-crafted ICMP ping and TCP SYN scanning over raw sockets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sends ICMP echo requests to one or more destinations.
    Ping(PingArgs),
    /// Runs a half-open TCP SYN scan against one or more destinations.
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
struct PingArgs {
    /// Destination IPv4 addresses.
    #[arg(required = true)]
    dst: Vec<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Probes sent per destination.
    #[arg(long)]
    count: Option<u32>,

    /// Milliseconds between successive probes to the same destination.
    #[arg(long)]
    interval: Option<u64>,

    /// Milliseconds to wait for a reply before a probe is declared lost.
    #[arg(long)]
    timeout: Option<u64>,

    /// Prints every reply as it arrives, not just the final summary.
    #[arg(long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Destination IPv4 addresses.
    #[arg(required = true)]
    dst: Vec<String>,

    /// Inclusive port range, e.g. `1-1024`.
    #[arg(long, value_name = "LO-HI")]
    ports: Option<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of handshakes in flight at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Milliseconds to wait for a SYN+ACK before a port is declared closed.
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Command::Ping(args) => args.config.as_ref(),
        Command::Scan(args) => args.config.as_ref(),
    };
    let config = match config_path {
        Some(path) => match load_from_path(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("failed to load configuration from {}: {err}", path.display());
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    if let Err(err) = probe_core::telemetry::init_tracing(&config.logging.level, config.logging.show_target) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    let outcome = match cli.command {
        Command::Ping(args) => run_ping(args, config).await,
        Command::Scan(args) => run_scan(args, config).await,
    };

    if let Err(err) = outcome {
        error!(%err, "probe failed");
        probe_core::telemetry::shutdown_tracing();
        std::process::exit(if matches!(err, ProbeError::Permission(_)) { 2 } else { 1 });
    }

    probe_core::telemetry::shutdown_tracing();
}

async fn run_ping(args: PingArgs, config: Config) -> probe_core::Result<()> {
    let destinations = parse_destinations(&args.dst)?;

    let mut options = config.ping.to_options();
    if let Some(count) = args.count {
        options.count = count;
    }
    if let Some(interval) = args.interval {
        options.interval = Duration::from_millis(interval);
    }
    if let Some(timeout) = args.timeout {
        options.timeout = Duration::from_millis(timeout);
    }
    options.verbose = options.verbose || args.verbose;
    options.validate()?;

    let socket = Arc::new(RawIcmp4::open()?);
    let correlator = Correlator::new();
    let cancel = CancellationToken::new();
    let recv_handle = {
        let socket: Arc<dyn probe_core::RawSocket> = socket.clone();
        let correlator = correlator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            probe_core::net::recv_loop(socket, cancel, move |ip, l4| correlator.dispatch(&ip, l4)).await;
        })
    };

    let ping = Arc::new(Ping::new(socket, correlator, config.ping.max_in_flight));
    let results = ping.run_many(destinations, options).await;

    cancel.cancel();
    let _ = recv_handle.await;

    let results = results?;
    for (dst, stats) in &results {
        info!(%dst, sent = stats.sent, received = stats.received, loss_pct = stats.loss_pct, "ping summary");
        println!("{dst}: {}/{} received, {:.1}% loss", stats.received, stats.sent, stats.loss_pct);
    }
    Ok(())
}

async fn run_scan(args: ScanArgs, config: Config) -> probe_core::Result<()> {
    let destinations = parse_destinations(&args.dst)?;

    let ports = match &args.ports {
        Some(raw) => parse_port_range(raw)?,
        None => config.scan.port_range(),
    };
    let concurrency = args.concurrency.unwrap_or(config.scan.concurrency);
    let timeout = args.timeout.map(Duration::from_millis).unwrap_or_else(|| config.scan.timeout());

    let src_ip = local_source_ip(destinations[0])?;

    let socket = Arc::new(RawTcp4::open()?);
    let correlator = Correlator::new();
    let cancel = CancellationToken::new();
    let recv_handle = {
        let socket: Arc<dyn probe_core::RawSocket> = socket.clone();
        let correlator = correlator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            probe_core::net::recv_loop(socket, cancel, move |ip, l4| correlator.dispatch(&ip, l4)).await;
        })
    };

    let report = scan(socket, correlator, src_ip, &destinations, ports, timeout, concurrency).await;

    cancel.cancel();
    let _ = recv_handle.await;

    let report = report?;
    for dst in &destinations {
        let mut open_ports: Vec<u16> = report
            .get(dst)
            .map(|ports| ports.iter().filter(|(_, &open)| open).map(|(&port, _)| port).collect())
            .unwrap_or_default();
        open_ports.sort_unstable();
        info!(%dst, open = ?open_ports, "scan summary");
        println!("{dst}: {open_ports:?}");
    }
    Ok(())
}

fn parse_destinations(raw: &[String]) -> probe_core::Result<Vec<Ipv4Addr>> {
    raw.iter().map(|s| parse_ipv4(s).map_err(ProbeError::from)).collect()
}

fn parse_port_range(raw: &str) -> probe_core::Result<PortRange> {
    let (lo, hi) = raw
        .split_once('-')
        .ok_or_else(|| ProbeError::InvalidConfig(format!("expected LO-HI port range, got {raw:?}")))?;
    let lo: u16 = lo.parse().map_err(|_| ProbeError::InvalidConfig(format!("invalid low port in range {raw:?}")))?;
    let hi: u16 = hi.parse().map_err(|_| ProbeError::InvalidConfig(format!("invalid high port in range {raw:?}")))?;
    let range = PortRange { lo, hi };
    range.validate()?;
    Ok(range)
}

/// Asks the kernel which local address it would route through to reach
/// `dst`, by connecting an unbound UDP socket (no packet is ever sent).
/// The raw TCP socket needs this to stamp the IPv4 source address and the
/// TCP pseudo-header checksum itself, since `IP_HDRINCL` stops the kernel
/// from filling either in.
fn local_source_ip(dst: Ipv4Addr) -> probe_core::Result<Ipv4Addr> {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(ProbeError::Io)?;
    probe.connect((dst, 80)).map_err(ProbeError::Io)?;
    match probe.local_addr().map_err(ProbeError::Io)?.ip() {
        std::net::IpAddr::V4(ip) => Ok(ip),
        std::net::IpAddr::V6(_) => {
            Err(ProbeError::InvalidConfig("local route to destination resolved to an IPv6 address".into()))
        }
    }
}
