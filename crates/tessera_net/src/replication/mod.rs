//! # Replication Loops
//!
//! The two background loops and what they share with the coordinator
//! context.
//!
//! ## Design
//!
//! ```text
//!                    ┌────────────── SnapshotCell ◀─── Session::tick (publish)
//!                    │  (RwLock<Arc<WorldSnapshot>>)
//!                    ▼
//! ┌───────────────────────────┐       ┌───────────────────────────┐
//! │ ServerLoop                │       │ ClientLoop                │
//! │  recv → route → dispatch  │       │  send local batch         │
//! │  flush outbox             │       │  send queued commands     │
//! │  send every bound entity  │       │  recv → route → dispatch  │
//! │  sleep(tick)              │       │  sleep(tick)              │
//! └───────────────────────────┘       └───────────────────────────┘
//! ```
//!
//! Loops read the latest published snapshot and never the world itself.
//! Replies that depend on world state (`ASSIGN_ID`, ownership answers) are
//! produced by dispatched actions and travel back to the server loop
//! through its outbox.

mod client;
mod peers;
mod server;

pub(crate) use client::{ClientLoop, ServerTarget};
pub use peers::PeerSet;
pub(crate) use server::ServerLoop;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tessera_shared::Transform;

use crate::dispatcher::DispatchHandle;
use crate::protocol::{Command, TransformRecord};
use crate::transport::TransportStats;
use crate::world::{Endpoint, NetId, World};

/// Most datagrams drained per loop iteration.
const MAX_DRAIN_PER_TICK: usize = 256;

/// One bound entity as published for the loops.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Replica {
    /// Network id.
    pub id: NetId,
    /// Authoritative or latest received transform.
    pub transform: Transform,
    /// Driven by this process.
    pub local: bool,
}

/// Immutable copy of the world taken at the end of a tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorldSnapshot {
    /// Coordinator tick that produced it.
    pub tick: u64,
    /// Every bound entity.
    pub replicas: Vec<Replica>,
}

impl WorldSnapshot {
    /// Replica for `id`.
    #[must_use]
    pub fn find(&self, id: NetId) -> Option<&Replica> {
        self.replicas.iter().find(|replica| replica.id == id)
    }

    /// Fills `out` with wire records; only local replicas if `local_only`.
    pub fn fill_records(&self, out: &mut Vec<TransformRecord>, local_only: bool) {
        out.clear();
        out.extend(
            self.replicas
                .iter()
                .filter(|replica| !local_only || replica.local)
                .map(|replica| TransformRecord::new(replica.id, replica.transform)),
        );
    }
}

/// Latest published snapshot. Readers never block the publisher for
/// longer than an `Arc` clone.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    current: RwLock<Arc<WorldSnapshot>>,
}

impl SnapshotCell {
    /// Starts with an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published snapshot.
    pub fn publish(&self, snapshot: WorldSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    /// Current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<WorldSnapshot> {
        Arc::clone(&*self.current.read())
    }
}

/// A reply queued for the server loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Send to one peer.
    Send {
        /// Recipient.
        to: Endpoint,
        /// Payload.
        command: Command,
    },
    /// Send to every known peer.
    Broadcast(Command),
}

/// What every loop needs from the session.
#[derive(Clone)]
pub(crate) struct LoopShared {
    pub cancel: Arc<AtomicBool>,
    pub snapshot: Arc<SnapshotCell>,
    pub dispatch: DispatchHandle<World>,
    pub stats: Arc<TransportStats>,
    pub tick_interval: Duration,
    pub max_datagram: usize,
}
