//! Raw socket abstraction: typed builders for the two socket flavors
//! this toolkit needs, both non-blocking and both AF_INET/SOCK_RAW.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{ProbeError, Result};

/// Common surface both raw socket flavors expose to the send/receive layer.
/// `handle()` returns a cheaply-cloneable reference suitable for moving into
/// a blocking task.
pub trait RawSocket: Send + Sync {
    fn handle(&self) -> Arc<Socket>;
}

/// A raw ICMP socket: the kernel writes the IPv4 header, callers supply
/// ICMP bytes only.
pub struct RawIcmp4 {
    socket: Arc<Socket>,
}

impl RawIcmp4 {
    /// Opens `AF_INET, SOCK_RAW, IPPROTO_ICMP` and puts it in non-blocking
    /// mode. Requires `CAP_NET_RAW` (or root) on Linux.
    pub fn open() -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ProbeError::Permission("opening a raw ICMP socket requires CAP_NET_RAW".into())
            } else {
                ProbeError::Io(e)
            }
        })?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket: Arc::new(socket) })
    }

    pub fn send(&self, bytes: &[u8], dst: Ipv4Addr) -> Result<usize> {
        let addr = SocketAddr::V4(SocketAddrV4::new(dst, 0));
        self.socket.send_to(bytes, &addr.into()).map_err(ProbeError::Io)
    }

    /// Reads one frame (IPv4 header included) into `buf`, returning the
    /// number of bytes written. Callers size `buf` to 65535.
    pub fn recv_frame(&self, buf: &mut [u8]) -> Result<usize> {
        recv_into(&self.socket, buf)
    }
}

impl RawSocket for RawIcmp4 {
    fn handle(&self) -> Arc<Socket> {
        self.socket.clone()
    }
}

/// A raw TCP socket with `IP_HDRINCL` set: callers supply the whole
/// IPv4+TCP packet, the kernel does not touch the IP header.
pub struct RawTcp4 {
    socket: Arc<Socket>,
}

impl RawTcp4 {
    pub fn open() -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ProbeError::Permission("opening a raw TCP socket requires CAP_NET_RAW".into())
            } else {
                ProbeError::Io(e)
            }
        })?;
        socket.set_header_included_v4(true)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket: Arc::new(socket) })
    }

    pub fn send(&self, bytes: &[u8], dst: Ipv4Addr) -> Result<usize> {
        let addr = SocketAddr::V4(SocketAddrV4::new(dst, 0));
        self.socket.send_to(bytes, &addr.into()).map_err(ProbeError::Io)
    }

    pub fn recv_frame(&self, buf: &mut [u8]) -> Result<usize> {
        recv_into(&self.socket, buf)
    }
}

impl RawSocket for RawTcp4 {
    fn handle(&self) -> Arc<Socket> {
        self.socket.clone()
    }
}

#[allow(unsafe_code)]
fn recv_into(socket: &Socket, buf: &mut [u8]) -> Result<usize> {
    // SAFETY: `recv` only ever writes initialized bytes into the spare
    // capacity it's given; reinterpreting `&mut [u8]` as `&mut [MaybeUninit<u8>]`
    // is sound because every `u8` is already a valid `MaybeUninit<u8>`.
    let spare = unsafe {
        std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast(), buf.len())
    };
    socket.recv(spare).map_err(ProbeError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires CAP_NET_RAW; exercised in privileged CI only"]
    fn opening_raw_icmp4_without_privilege_reports_permission() {
        match RawIcmp4::open() {
            Ok(_) => {}
            Err(ProbeError::Permission(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
