//! TCP flow controller: drives one half-open (or fully handshaken)
//! TCP connection through `INIT -> SYN_SENT -> ESTABLISHED -> FIN_SENT/CLOSED`.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::correlator::{Correlator, Probe, ProbeKind, ProbeResult};
use crate::error::{ProbeError, Result};
use crate::net::{send_frame, RawSocket};
use crate::tcp::{TcpFlags, TcpHeader};

/// Flow lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Init,
    SynSent,
    Established,
    FinSent,
    Closed,
}

/// The negotiated state a flow accumulates over the handshake, notably the
/// peer's advertised MSS when present (recovered from the original
/// implementation's per-flow connection record, which this toolkit's surface
/// omits but which genuinely constrains how much payload a flow can send).
#[derive(Debug, Clone, Copy, Default)]
pub struct Negotiated {
    pub remote_mss: Option<u16>,
}

/// Parameters identifying one TCP flow: the four-tuple plus the initial
/// sequence number and IP identification this flow starts from.
#[derive(Debug, Clone, Copy)]
pub struct FlowAddr {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
}

/// Drives the handshake/teardown state machine for one TCP flow over a
/// shared raw TCP socket and correlator.
pub struct TcpFlow {
    addr: FlowAddr,
    socket: Arc<dyn RawSocket>,
    correlator: Correlator,
    state: FlowState,
    next_seq: u32,
    next_ack: u32,
    next_ip_id: u32,
    reset: bool,
    negotiated: Negotiated,
    timeout: Duration,
    listener_cancel: CancellationToken,
}

static FLOW_ID_COUNTER: AtomicU32 = AtomicU32::new(1);

impl TcpFlow {
    /// `initial_seq` and `initial_ip_id` seed the flow's monotonically
    /// increasing counters; each is scoped to this flow only, to avoid
    /// cross-flow coupling of IP identification or sequence numbers.
    pub fn new(
        addr: FlowAddr,
        socket: Arc<dyn RawSocket>,
        correlator: Correlator,
        initial_seq: u32,
        initial_ip_id: u16,
        timeout: Duration,
    ) -> Self {
        Self {
            addr,
            socket,
            correlator,
            state: FlowState::Init,
            next_seq: initial_seq,
            next_ack: 0,
            next_ip_id: u32::from(initial_ip_id),
            reset: false,
            negotiated: Negotiated::default(),
            timeout,
            listener_cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn handshake_completed(&self) -> bool {
        self.state == FlowState::Established
    }

    pub fn reset(&self) -> bool {
        self.reset
    }

    pub fn negotiated(&self) -> Negotiated {
        self.negotiated
    }

    fn next_ip_identification(&mut self) -> u16 {
        let id = self.next_ip_id as u16;
        self.next_ip_id = self.next_ip_id.wrapping_add(1);
        id
    }

    /// `INIT -> SYN_SENT`: transmits a bare SYN and registers the probe
    /// awaiting `SYN+ACK`/`RST`/timeout.
    pub async fn handshake(&mut self) -> Result<ProbeResult> {
        if self.state != FlowState::Init {
            return Err(ProbeError::InvalidConfig("handshake() called outside INIT state".into()));
        }

        let syn = TcpHeader {
            source_port: self.addr.src_port,
            destination_port: self.addr.dst_port,
            sequence_number: self.next_seq,
            acknowledgment_number: 0,
            reserved: 0,
            flags: TcpFlags::SYN,
            window_size: 64240,
            checksum: 0,
            urgent_pointer: 0,
            options: vec![],
        };
        self.transmit(&syn, &[]).await?;
        self.state = FlowState::SynSent;

        let probe = Probe::new(
            std::net::IpAddr::V4(self.addr.dst_ip),
            ProbeKind::TcpSyn { src_ip: self.addr.src_ip, src_port: self.addr.src_port, dst_port: self.addr.dst_port },
            self.timeout,
        );
        let (id, rx) = self.correlator.register(probe);

        let result = tokio::select! {
            received = rx => received.unwrap_or(ProbeResult::Timeout),
            _ = tokio::time::sleep(self.timeout) => {
                self.correlator.expire(id);
                ProbeResult::Timeout
            }
        };

        match result {
            ProbeResult::TcpSynAck { remote_seq, remote_mss } => {
                self.next_seq = self.next_seq.wrapping_add(1);
                self.next_ack = remote_seq.wrapping_add(1);
                self.negotiated.remote_mss = remote_mss;
                self.state = FlowState::Established;

                let ack = TcpHeader {
                    source_port: self.addr.src_port,
                    destination_port: self.addr.dst_port,
                    sequence_number: self.next_seq,
                    acknowledgment_number: self.next_ack,
                    reserved: 0,
                    flags: TcpFlags::ACK,
                    window_size: 64240,
                    checksum: 0,
                    urgent_pointer: 0,
                    options: vec![],
                };
                self.transmit(&ack, &[]).await?;
                debug!(dst = %self.addr.dst_ip, port = self.addr.dst_port, "handshake complete");
            }
            ProbeResult::TcpRstAck => {
                self.reset = true;
                self.state = FlowState::Closed;
            }
            ProbeResult::Timeout => {
                self.state = FlowState::Closed;
            }
            other => {
                warn!(?other, "unexpected probe result for a SYN handshake");
                self.state = FlowState::Closed;
            }
        }
        Ok(result)
    }

    /// `ESTABLISHED -> ESTABLISHED`: transmits ACK+payload, advancing `seq`
    /// by the payload length.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.state != FlowState::Established {
            return Err(ProbeError::InvalidConfig("send() called outside ESTABLISHED".into()));
        }
        let segment = TcpHeader {
            source_port: self.addr.src_port,
            destination_port: self.addr.dst_port,
            sequence_number: self.next_seq,
            acknowledgment_number: self.next_ack,
            reserved: 0,
            flags: TcpFlags::ACK | TcpFlags::PSH,
            window_size: 64240,
            checksum: 0,
            urgent_pointer: 0,
            options: vec![],
        };
        self.transmit(&segment, data).await?;
        self.next_seq = self.next_seq.wrapping_add(data.len() as u32);
        Ok(())
    }

    /// `ESTABLISHED -> ESTABLISHED` on the receive side: advances `ack` by
    /// the remote payload length already delivered to the caller.
    pub fn record_received(&mut self, remote_payload_len: usize) {
        self.next_ack = self.next_ack.wrapping_add(remote_payload_len as u32);
    }

    /// `ESTABLISHED -> FIN_SENT`: transmits FIN+ACK and cancels the listener.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == FlowState::Established {
            let fin = TcpHeader {
                source_port: self.addr.src_port,
                destination_port: self.addr.dst_port,
                sequence_number: self.next_seq,
                acknowledgment_number: self.next_ack,
                reserved: 0,
                flags: TcpFlags::FIN | TcpFlags::ACK,
                window_size: 64240,
                checksum: 0,
                urgent_pointer: 0,
                options: vec![],
            };
            self.transmit(&fin, &[]).await?;
            self.next_seq = self.next_seq.wrapping_add(1);
            self.state = FlowState::FinSent;
        }
        self.cancel_listener();
        Ok(())
    }

    /// `any -> CLOSED`: cancels the listener unconditionally; `close_socket`
    /// is left to the caller (the socket is shared across flows within one
    /// scan, per the concurrency model).
    pub fn force_close(&mut self) {
        self.state = FlowState::Closed;
        self.cancel_listener();
    }

    pub fn listener_cancellation(&self) -> CancellationToken {
        self.listener_cancel.clone()
    }

    fn cancel_listener(&self) {
        self.listener_cancel.cancel();
    }

    async fn transmit(&mut self, tcp: &TcpHeader, payload: &[u8]) -> Result<()> {
        let ip_id = self.next_ip_identification();
        let header = crate::ipv4::Ipv4Header {
            ihl: 5,
            dscp: 0,
            ecn: 0,
            total_length: 0,
            identification: ip_id,
            flags: crate::ipv4::Ipv4Flags::DONT_FRAGMENT,
            fragment_offset: 0,
            ttl: 64,
            protocol: crate::ipv4::IpProtocol::Tcp,
            checksum: None,
            source: self.addr.src_ip,
            destination: self.addr.dst_ip,
            options: vec![],
        };
        let tcp_bytes = tcp.encode(self.addr.src_ip, self.addr.dst_ip, payload)?;
        let mut segment = tcp_bytes;
        segment.extend_from_slice(payload);
        let ip_bytes = header.encode(segment.len())?;
        let mut packet = ip_bytes;
        packet.extend_from_slice(&segment);

        let (_written, _submitted_at) = send_frame(&*self.socket, packet, self.addr.dst_ip).await?;
        Ok(())
    }
}

/// Allocates a flow-scoped identifier, distinct from [`crate::correlator::ProbeId`],
/// useful for log correlation across a scan's many concurrent flows.
pub fn next_flow_id() -> u32 {
    FLOW_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}
