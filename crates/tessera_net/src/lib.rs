//! # Tessera Net - Authoritative Transform Replication
//!
//! A small state-replication protocol over UDP: peers find a coordinator,
//! receive stable identities, stream per-entity transforms at a fixed tick
//! and negotiate who may write which entity.
//!
//! ## Architecture
//!
//! ```text
//!  background threads                         coordinator context
//! ┌──────────────┐                          ┌──────────────────────┐
//! │ discovery    │  SERVER_HERE             │ Session::tick()      │
//! ├──────────────┤                          │  1. drain dispatcher │
//! │ server loop  │──┐   actions (channel)   │  2. advance smoothing│
//! ├──────────────┤  ├──────────────────────▶│  3. publish snapshot │
//! │ client loop  │──┘                       └──────────┬───────────┘
//! └──────▲───────┘                                     │
//!        └────────────── WorldSnapshot (RwLock) ◀──────┘
//! ```
//!
//! The entity table has exactly one writer: the context calling
//! [`Session::tick`]. Loops only read published snapshots and submit
//! mutations through the [`Dispatcher`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_net::{NetConfig, Role, SceneGate, SessionBuilder, EntityKind};
//! use tessera_shared::Transform;
//!
//! let mut session = SessionBuilder::new(Role::Host, NetConfig::default()).build()?;
//! let player = session.spawn_local(EntityKind::Player, Transform::IDENTITY)?;
//!
//! let gate = SceneGate::new();
//! gate.mark_ready();
//! session.start(&gate)?;
//!
//! loop {
//!     session.set_transform(player, next_transform())?;
//!     session.tick(1.0 / 60.0);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod replication;
pub mod session;
pub mod transport;
pub mod world;

// Re-exports for convenience
pub use config::NetConfig;
pub use discovery::{DiscoveryResponder, DISCOVERY_PROBE, DISCOVERY_REPLY};
pub use dispatcher::{DispatchHandle, Dispatcher, DrainReport};
pub use error::{ConfigError, NetError, NetResult, WireError};
pub use protocol::{Command, Packet, PacketType, TransformRecord};
pub use replication::{Outbound, PeerSet, Replica, SnapshotCell, WorldSnapshot};
pub use session::{
    LinkState, ParseRoleError, Role, SceneGate, Session, SessionBuilder, SessionStats, TickReport,
};
pub use transport::{TransportStats, TransportStatsSnapshot, UdpTransport};
pub use world::{
    ActorFactory, Endpoint, EntityKey, EntityKind, EntityTable, IdAllocator, MergeMode, MergeSummary,
    NetEntity, NetId, NullFactory, OwnershipState, World,
};
