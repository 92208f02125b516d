//! # Discovery Rendezvous
//!
//! Participants that do not know the coordinator's address broadcast a
//! probe on the discovery port; the coordinator answers from its own
//! address.
//!
//! ```text
//! participant                          coordinator:discovery_port
//!   |--- "DISCOVER_SERVER" (broadcast) --->|
//!   |<-- "SERVER_HERE" --------------------|   sender IP = coordinator
//! ```
//!
//! Both payloads are matched byte for byte, including length. Anything else
//! on the discovery port is dropped without a reply.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{NetError, NetResult};
use crate::transport::{TransportStats, UdpTransport};

/// Probe payload.
pub const DISCOVERY_PROBE: &[u8] = b"DISCOVER_SERVER";

/// Reply payload.
pub const DISCOVERY_REPLY: &[u8] = b"SERVER_HERE";

/// Exact probe match.
#[inline]
#[must_use]
pub fn is_probe(payload: &[u8]) -> bool {
    payload == DISCOVERY_PROBE
}

/// Exact reply match.
#[inline]
#[must_use]
pub fn is_reply(payload: &[u8]) -> bool {
    payload == DISCOVERY_REPLY
}

/// Answers discovery probes until cancelled.
pub struct DiscoveryResponder {
    transport: UdpTransport,
    cancel: Arc<AtomicBool>,
}

impl DiscoveryResponder {
    /// Binds the discovery port.
    ///
    /// # Errors
    ///
    /// [`NetError::Bind`] if the port is taken.
    pub fn bind(
        addr: SocketAddr,
        poll: Duration,
        cancel: Arc<AtomicBool>,
        stats: Arc<TransportStats>,
    ) -> NetResult<Self> {
        let transport =
            UdpTransport::bind(addr, poll, stats).map_err(|source| NetError::Bind { addr, source })?;
        Ok(Self { transport, cancel })
    }

    /// Bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Serves probes until the cancel flag is set.
    pub fn run(mut self) {
        info!(addr = %self.local_addr(), "discovery responder listening");

        while !self.cancel.load(Ordering::Relaxed) {
            let sender = match self.transport.recv() {
                Ok(Some((payload, from))) if is_probe(payload) => from,
                Ok(Some((payload, from))) => {
                    debug!(len = payload.len(), %from, "ignoring datagram on discovery port");
                    continue;
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "discovery receive failed");
                    continue;
                }
            };

            match self.transport.send_to(DISCOVERY_REPLY, sender) {
                Ok(_) => info!(%sender, "answered discovery probe"),
                Err(e) => warn!(%sender, error = %e, "discovery reply failed"),
            }
        }

        info!("discovery responder stopped");
    }
}

/// Broadcasts one probe to `target`, then waits until a coordinator answers,
/// the deadline passes, or `cancel` is set.
///
/// Returns the source IP of the first exact reply.
///
/// # Errors
///
/// [`NetError::Bind`] or socket-option failures on the probe socket.
pub fn locate(
    bind_ip: IpAddr,
    target: SocketAddr,
    timeout: Duration,
    poll: Duration,
    cancel: &AtomicBool,
) -> NetResult<Option<IpAddr>> {
    let addr = SocketAddr::new(bind_ip, 0);
    let mut transport = UdpTransport::bind(addr, poll, Arc::new(TransportStats::default()))
        .map_err(|source| NetError::Bind { addr, source })?;
    transport.enable_broadcast()?;

    let deadline = Instant::now() + timeout;
    info!(%target, "searching for a coordinator");
    if let Err(e) = transport.send_to(DISCOVERY_PROBE, target) {
        warn!(%target, error = %e, "discovery probe failed");
    }

    // Each receive blocks for at most one poll, so cancellation is observed.
    while Instant::now() < deadline && !cancel.load(Ordering::Relaxed) {
        match transport.recv() {
            Ok(Some((payload, from))) if is_reply(payload) => {
                info!(ip = %from.ip(), "coordinator found");
                return Ok(Some(from.ip()));
            }
            Ok(Some(_) | None) => {}
            Err(e) => warn!(error = %e, "discovery receive failed"),
        }
    }

    warn!(?timeout, "no coordinator answered");
    Ok(None)
}
