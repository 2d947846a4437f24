//! # UDP Link
//!
//! A thin non-blocking wrapper around a connected [`UdpSocket`], one per
//! bonded physical path (spec §4.7). No retries, no framing — just I/O,
//! with `WouldBlock` folded into `Ok(None)` so callers can poll it in a
//! cooperative loop without an async runtime.

use std::io;
use std::net::{SocketAddr, UdpSocket};

/// One physical UDP path between client and server.
pub struct UdpLink {
    socket: UdpSocket,
    label: &'static str,
}

impl UdpLink {
    /// Bind `local_bind` and connect to `remote`, labeling the link for
    /// logging (`"primary"` / `"backup"`).
    pub fn connect(local_bind: SocketAddr, remote: SocketAddr, label: &'static str) -> io::Result<Self> {
        let socket = UdpSocket::bind(local_bind)?;
        socket.connect(remote)?;
        socket.set_nonblocking(true)?;
        Ok(UdpLink { socket, label })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send a datagram on the connected peer.
    pub fn send(&self, bytes: &[u8]) -> io::Result<usize> {
        self.socket.send(bytes)
    }

    /// Poll for one inbound datagram without blocking. `Ok(None)` means
    /// nothing was waiting; any other I/O error is propagated.
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
