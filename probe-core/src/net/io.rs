//! Send/receive primitives: blocking-task offload for `sendto`, and a
//! cancelable receiver loop that hands decoded IPv4 frames to a dispatcher.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::Socket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{ProbeError, Result};
use crate::ipv4::Ipv4Header;

use super::raw_socket::RawSocket;

/// Maximum size of a single received frame (IPv4 header included).
pub const MAX_FRAME_LEN: usize = 65535;

/// How long an empty `recv` (`WouldBlock`) backs off before the next
/// attempt. The socket is non-blocking, so without this the loop would spin
/// a worker thread at full CPU between frames instead of parking it.
const EMPTY_POLL_BACKOFF: Duration = Duration::from_millis(20);

/// Submits `bytes` to the kernel via a blocking worker thread so the async
/// scheduler is never blocked on a raw-socket syscall. Returns the number of
/// bytes written and the instant the syscall was issued, so the caller can
/// stamp a probe's submission time.
pub async fn send_frame(
    socket: &(impl RawSocket + ?Sized),
    bytes: Vec<u8>,
    dst: Ipv4Addr,
) -> Result<(usize, Instant)> {
    let handle = socket.handle();
    let submitted_at = Instant::now();
    let written = tokio::task::spawn_blocking(move || send_blocking(&handle, &bytes, dst))
        .await
        .map_err(|e| ProbeError::Io(std::io::Error::other(e.to_string())))??;
    Ok((written, submitted_at))
}

fn send_blocking(socket: &Socket, bytes: &[u8], dst: Ipv4Addr) -> Result<usize> {
    use std::net::{SocketAddr, SocketAddrV4};
    let addr = SocketAddr::V4(SocketAddrV4::new(dst, 0));
    socket.send_to(bytes, &addr.into()).map_err(ProbeError::Io)
}

/// Repeatedly reads frames off `socket`, decodes the IPv4 header, and
/// invokes `dispatch` with the header and the remaining payload (the L4
/// header + data). Runs until `cancel` fires, at which point the loop
/// returns promptly without touching the socket's lifetime — the caller
/// still owns it and may keep using it.
pub async fn recv_loop<F>(socket: Arc<dyn RawSocket>, cancel: CancellationToken, mut dispatch: F)
where
    F: FnMut(Ipv4Header, &[u8]) + Send,
{
    loop {
        let handle = socket.handle();
        let recv = tokio::task::spawn_blocking(move || recv_blocking(&handle));

        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("receive loop cancelled");
                return;
            }
            result = recv => result,
        };

        let bytes = match frame {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("receive loop cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(EMPTY_POLL_BACKOFF) => {}
                }
                continue;
            }
            Ok(Err(err)) => {
                warn!(%err, "raw socket read failed");
                continue;
            }
            Err(join_err) => {
                warn!(%join_err, "receive task panicked");
                continue;
            }
        };

        match Ipv4Header::decode(&bytes) {
            Ok((header, payload)) => dispatch(header, payload),
            Err(err) => trace!(%err, "discarding frame that failed IPv4 decode"),
        }
    }
}

/// One blocking `recv`, tolerant of `WouldBlock` (reported as `Ok(None)` so
/// the async loop can re-check the cancellation token before blocking again).
#[allow(unsafe_code)]
fn recv_blocking(socket: &Socket) -> Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; MAX_FRAME_LEN];
    // SAFETY: see `raw_socket::recv_into` — casting initialized `u8` storage
    // to `MaybeUninit<u8>` is always sound.
    let spare = unsafe {
        std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast(), buf.len())
    };
    match socket.recv(spare) {
        Ok(len) => {
            buf.truncate(len);
            Ok(Some(buf))
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(ProbeError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recv_loop_returns_promptly_on_cancel() {
        // A closed/never-opened socket can't be constructed without
        // privilege, so this exercises only the cancellation plumbing via a
        // token that is already cancelled before the loop starts.
        let cancel = CancellationToken::new();
        cancel.cancel();

        struct NeverReady;
        impl RawSocket for NeverReady {
            fn handle(&self) -> Arc<Socket> {
                unreachable!("cancelled before first recv")
            }
        }

        recv_loop(Arc::new(NeverReady), cancel, |_, _| {
            panic!("dispatch should never run");
        })
        .await;
    }
}
