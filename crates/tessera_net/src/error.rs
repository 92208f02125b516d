//! # Error Types
//!
//! Every failure in the replication core is local: nothing here is fatal to
//! the process. Loops log and continue; the session surfaces setup errors.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::world::{Endpoint, EntityKey, NetId};

/// Errors raised while decoding a datagram.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Zero-length datagram.
    #[error("empty datagram")]
    Empty,

    /// First byte is not a known packet type.
    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),

    /// Batch header declares a negative record count.
    #[error("negative record count {0}")]
    NegativeCount(i32),

    /// Payload shorter than its header promises.
    #[error("truncated packet: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the header requires.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// Payload longer than its header promises.
    #[error("trailing bytes: expected {expected} bytes, got {actual}")]
    TrailingBytes {
        /// Bytes the header requires.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The TOML document did not parse.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent with another.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Session-level errors.
#[derive(Error, Debug)]
pub enum NetError {
    /// A socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Any other socket error.
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Undecodable datagram.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The scene never signalled readiness.
    #[error("scene not ready after {0} ms")]
    SceneNotReady(u64),

    /// `start` was called twice.
    #[error("session already started")]
    AlreadyStarted,

    /// The requested operation needs a role this session does not have.
    #[error("operation `{0}` is not available for this role")]
    WrongRole(&'static str),

    /// A background thread could not be spawned.
    #[error("failed to spawn thread `{name}`: {source}")]
    Spawn {
        /// Thread name.
        name: &'static str,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// No entity carries this network id.
    #[error("unknown entity id {0}")]
    UnknownEntity(NetId),

    /// No entity lives in this slot.
    #[error("unknown entity key {0:?}")]
    UnknownKey(EntityKey),

    /// Network id already bound to another entity.
    #[error("entity id {0} is already bound")]
    DuplicateId(NetId),

    /// Negative ids cannot be bound.
    #[error("cannot bind unassigned id {0}")]
    InvalidId(NetId),

    /// Identity counter overflowed.
    #[error("entity id space exhausted")]
    IdsExhausted,

    /// `ASSIGN_ID` arrived but no local actor was waiting for one.
    #[error("received id {0} but no local entity is waiting for one")]
    NoPendingEntity(NetId),

    /// Ownership requested while another endpoint holds it.
    #[error("entity {id} is owned by {owner}, request from {requester} rejected")]
    AlreadyOwned {
        /// Entity in question.
        id: NetId,
        /// Current owner.
        owner: Endpoint,
        /// Endpoint that asked.
        requester: Endpoint,
    },

    /// Ownership released by an endpoint that does not hold it.
    #[error("release of entity {id} from {sender} rejected: owner is {owner:?}")]
    NotOwner {
        /// Entity in question.
        id: NetId,
        /// Registered owner, if any.
        owner: Option<Endpoint>,
        /// Endpoint that tried to release.
        sender: Endpoint,
    },

    /// Peer sent a command only the coordinator may send, or vice versa.
    #[error("unexpected command {command} from {sender}")]
    UnexpectedCommand {
        /// Rendered command.
        command: String,
        /// Who sent it.
        sender: Endpoint,
    },

    /// The transform of a remotely owned or passive entity was written locally.
    #[error("entity {0:?} is not locally authoritative")]
    NotAuthoritative(EntityKey),
}

/// Result type for session operations.
pub type NetResult<T> = Result<T, NetError>;
