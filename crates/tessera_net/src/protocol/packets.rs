//! # Packet Definitions
//!
//! Typed forms of everything that travels on the gameplay port.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use tessera_shared::Transform;

use crate::world::NetId;

/// Types of packets in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Bidirectional: transform batch.
    Batch = 0,
    /// Participant -> Coordinator: ask for a fresh entity id.
    RequestId = 1,
    /// Coordinator -> Participant: the id for the pending local entity.
    AssignId = 2,
    /// Participant -> Coordinator: ask for write authority.
    RequestOwnership = 3,
    /// Coordinator -> Participant: write authority granted.
    OwnershipGranted = 4,
    /// Participant -> Coordinator: give write authority back.
    ReleaseOwnership = 5,
    /// Coordinator -> All: an entity has no remote owner any more.
    OwnershipReleased = 6,
}

impl PacketType {
    /// Maps a tag byte back to a packet type.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Batch),
            1 => Some(Self::RequestId),
            2 => Some(Self::AssignId),
            3 => Some(Self::RequestOwnership),
            4 => Some(Self::OwnershipGranted),
            5 => Some(Self::ReleaseOwnership),
            6 => Some(Self::OwnershipReleased),
            _ => None,
        }
    }
}

/// Control messages.
///
/// `Display` renders the textual form used in logs, e.g. `ASSIGN_ID:7`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Ask the coordinator for an id.
    RequestId,
    /// Id assigned to the requester's pending entity.
    AssignId(NetId),
    /// Ask for write authority over an entity.
    RequestOwnership(NetId),
    /// Write authority granted to the recipient.
    OwnershipGranted(NetId),
    /// Hand write authority back.
    ReleaseOwnership(NetId),
    /// Entity is back under coordinator authority.
    OwnershipReleased(NetId),
}

impl Command {
    /// Wire tag for this command.
    #[must_use]
    pub const fn packet_type(self) -> PacketType {
        match self {
            Self::RequestId => PacketType::RequestId,
            Self::AssignId(_) => PacketType::AssignId,
            Self::RequestOwnership(_) => PacketType::RequestOwnership,
            Self::OwnershipGranted(_) => PacketType::OwnershipGranted,
            Self::ReleaseOwnership(_) => PacketType::ReleaseOwnership,
            Self::OwnershipReleased(_) => PacketType::OwnershipReleased,
        }
    }

    /// Entity id carried by the command, if any.
    #[must_use]
    pub const fn entity(self) -> Option<NetId> {
        match self {
            Self::RequestId => None,
            Self::AssignId(id)
            | Self::RequestOwnership(id)
            | Self::OwnershipGranted(id)
            | Self::ReleaseOwnership(id)
            | Self::OwnershipReleased(id) => Some(id),
        }
    }

    /// Rebuilds a command from its tag and optional id.
    #[must_use]
    pub const fn from_parts(kind: PacketType, id: NetId) -> Option<Self> {
        match kind {
            PacketType::Batch => None,
            PacketType::RequestId => Some(Self::RequestId),
            PacketType::AssignId => Some(Self::AssignId(id)),
            PacketType::RequestOwnership => Some(Self::RequestOwnership(id)),
            PacketType::OwnershipGranted => Some(Self::OwnershipGranted(id)),
            PacketType::ReleaseOwnership => Some(Self::ReleaseOwnership(id)),
            PacketType::OwnershipReleased => Some(Self::OwnershipReleased(id)),
        }
    }

    /// Only the coordinator may send this command.
    #[must_use]
    pub const fn is_coordinator_only(self) -> bool {
        matches!(
            self,
            Self::AssignId(_) | Self::OwnershipGranted(_) | Self::OwnershipReleased(_)
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestId => f.write_str("REQUEST_ID"),
            Self::AssignId(id) => write!(f, "ASSIGN_ID:{id}"),
            Self::RequestOwnership(id) => write!(f, "REQUEST_OWNERSHIP:{id}"),
            Self::OwnershipGranted(id) => write!(f, "OWNERSHIP_GRANTED:{id}"),
            Self::ReleaseOwnership(id) => write!(f, "RELEASE_OWNERSHIP:{id}"),
            Self::OwnershipReleased(id) => write!(f, "OWNERSHIP_RELEASED:{id}"),
        }
    }
}

/// One entity's transform as carried in a batch.
///
/// Size: 44 bytes, no padding.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TransformRecord {
    /// Raw entity id. Negative values are never applied.
    pub id: i32,
    /// Position, rotation, scale.
    pub transform: Transform,
}

impl TransformRecord {
    /// Creates a record.
    #[inline]
    #[must_use]
    pub const fn new(id: NetId, transform: Transform) -> Self {
        Self { id: id.0, transform }
    }

    /// Entity id as a [`NetId`].
    #[inline]
    #[must_use]
    pub const fn net_id(&self) -> NetId {
        NetId(self.id)
    }
}

/// A decoded gameplay datagram.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    /// Transform batch.
    Batch(Vec<TransformRecord>),
    /// Control message.
    Command(Command),
}

impl Packet {
    /// Wire tag of this packet.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Batch(_) => PacketType::Batch,
            Self::Command(command) => command.packet_type(),
        }
    }
}
