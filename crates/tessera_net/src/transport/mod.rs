//! # Transport Layer
//!
//! Thin UDP wrapper shared by the coordinator loop, the participant loop
//! and discovery.
//!
//! ## Design
//!
//! - Blocking sockets with a read timeout: a poll that finds nothing is
//!   `Ok(None)`, not an error
//! - `ConnectionReset` (ICMP port unreachable on some platforms) surfaces
//!   as an error for the caller to log, and never ends a loop
//! - Counters are atomics behind an `Arc`, readable from any thread

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Largest datagram a socket may receive (one byte over the UDP payload
/// limit, so an oversize datagram is detectable).
const RECV_BUFFER_SIZE: usize = 65_536;

/// Transport statistics, shared between a loop and its observers.
#[derive(Debug, Default)]
pub struct TransportStats {
    /// Datagrams sent.
    pub packets_sent: AtomicU64,
    /// Datagrams received.
    pub packets_received: AtomicU64,
    /// Bytes sent.
    pub bytes_sent: AtomicU64,
    /// Bytes received.
    pub bytes_received: AtomicU64,
    /// Failed sends.
    pub send_errors: AtomicU64,
    /// Failed receives (timeouts excluded).
    pub recv_errors: AtomicU64,
    /// Datagrams that did not decode.
    pub decode_errors: AtomicU64,
    /// Batches refused for exceeding the datagram limit.
    pub oversize_batches: AtomicU64,
    /// Datagrams dropped because they did not come from the coordinator.
    pub foreign_packets: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    /// Datagrams sent.
    pub packets_sent: u64,
    /// Datagrams received.
    pub packets_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Failed sends.
    pub send_errors: u64,
    /// Failed receives.
    pub recv_errors: u64,
    /// Datagrams that did not decode.
    pub decode_errors: u64,
    /// Batches refused for size.
    pub oversize_batches: u64,
    /// Datagrams from endpoints other than the coordinator.
    pub foreign_packets: u64,
}

impl TransportStats {
    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            oversize_batches: self.oversize_batches.load(Ordering::Relaxed),
            foreign_packets: self.foreign_packets.load(Ordering::Relaxed),
        }
    }

    /// Counts an undecodable datagram.
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a batch that was too large to send.
    pub fn record_oversize(&self) {
        self.oversize_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a datagram from an unexpected sender.
    pub fn record_foreign(&self) {
        self.foreign_packets.fetch_add(1, Ordering::Relaxed);
    }
}

/// UDP socket wrapper for the replication loops.
pub struct UdpTransport {
    /// The underlying socket.
    socket: UdpSocket,
    /// Local address.
    local_addr: SocketAddr,
    /// Receive buffer.
    recv_buffer: Vec<u8>,
    /// Statistics.
    stats: Arc<TransportStats>,
}

impl UdpTransport {
    /// Binds a socket whose receive calls give up after `poll`.
    ///
    /// # Errors
    ///
    /// Bind or socket-option failure.
    pub fn bind(addr: SocketAddr, poll: Duration, stats: Arc<TransportStats>) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(poll))?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            recv_buffer: vec![0u8; RECV_BUFFER_SIZE],
            stats,
        })
    }

    /// Allows sending to broadcast addresses.
    ///
    /// # Errors
    ///
    /// Socket-option failure.
    pub fn enable_broadcast(&self) -> io::Result<()> {
        self.socket.set_broadcast(true)
    }

    /// Returns the local address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends a datagram to `addr`.
    ///
    /// # Errors
    ///
    /// Propagates the socket error after counting it.
    pub fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        match self.socket.send_to(data, addr) {
            Ok(n) => {
                self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Waits up to the poll timeout for one datagram.
    ///
    /// # Errors
    ///
    /// Any receive failure other than a timeout.
    pub fn recv(&mut self) -> io::Result<Option<(&[u8], SocketAddr)>> {
        let received = self.receive()?;
        Ok(received.map(|(len, addr)| (&self.recv_buffer[..len], addr)))
    }

    /// Returns a datagram only if one is already queued.
    ///
    /// # Errors
    ///
    /// Any receive failure other than "nothing queued".
    pub fn try_recv(&mut self) -> io::Result<Option<(&[u8], SocketAddr)>> {
        self.socket.set_nonblocking(true)?;
        let received = self.receive();
        self.socket.set_nonblocking(false)?;
        Ok(received?.map(|(len, addr)| (&self.recv_buffer[..len], addr)))
    }

    fn receive(&mut self) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((len, addr)) => {
                self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
                Ok(Some((len, addr)))
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => {
                self.stats.recv_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Shared statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<TransportStats> {
        &self.stats
    }
}

/// True for the error kinds a read timeout produces.
#[must_use]
pub fn is_timeout(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
