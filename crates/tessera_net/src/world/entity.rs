//! Entity identity and per-entity replication state.

use std::fmt;
use std::net::SocketAddr;

use tessera_shared::Transform;

/// Network-wide entity id, assigned by the coordinator.
///
/// `-1` means "not yet assigned"; other negatives are never valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(pub i32);

impl NetId {
    /// Placeholder for entities still waiting for an id.
    pub const UNASSIGNED: Self = Self(-1);

    /// True for every id the coordinator could have handed out.
    #[inline]
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local slot of an entity. Stable for the lifetime of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(pub u32);

/// A remote peer, identified by the exact source address of its datagrams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Wraps a socket address.
    #[inline]
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// The underlying address.
    #[inline]
    #[must_use]
    pub const fn addr(self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What an entity represents in the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A player avatar.
    Player,
    /// Scene furniture with a fixed, pre-placed id.
    LevelObject,
    /// Created because the wire mentioned an id we had never seen.
    Remote,
}

/// A replicated entity.
#[derive(Clone, Debug)]
pub struct NetEntity {
    pub(crate) id: NetId,
    pub(crate) kind: EntityKind,
    pub(crate) transform: Transform,
    pub(crate) smoothed: Transform,
    pub(crate) owner: Option<Endpoint>,
    pub(crate) local: bool,
    pub(crate) native: bool,
}

impl NetEntity {
    /// An entity this process drives.
    #[must_use]
    pub const fn native(kind: EntityKind, id: NetId, transform: Transform) -> Self {
        Self {
            id,
            kind,
            transform,
            smoothed: transform,
            owner: None,
            local: true,
            native: true,
        }
    }

    /// An entity driven by someone else.
    #[must_use]
    pub const fn passive(kind: EntityKind, id: NetId, transform: Transform) -> Self {
        Self {
            id,
            kind,
            transform,
            smoothed: transform,
            owner: None,
            local: false,
            native: false,
        }
    }

    /// Network id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> NetId {
        self.id
    }

    /// Scene role.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Authoritative value for local entities, latest received value otherwise.
    #[inline]
    #[must_use]
    pub const fn transform(&self) -> Transform {
        self.transform
    }

    /// What should be drawn: the transform itself for local entities, the
    /// smoothed approach towards it for passive ones.
    #[inline]
    #[must_use]
    pub const fn presented(&self) -> Transform {
        if self.local {
            self.transform
        } else {
            self.smoothed
        }
    }

    /// Remote endpoint holding write authority (coordinator view).
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> Option<Endpoint> {
        self.owner
    }

    /// Whether this process currently writes the entity.
    #[inline]
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.local
    }

    /// Whether this process created the entity (and so resumes authority
    /// over it after a release).
    #[inline]
    #[must_use]
    pub const fn is_native(&self) -> bool {
        self.native
    }

    /// Unbound passive entity, available for adoption by an unknown id.
    #[inline]
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        !self.id.is_assigned() && !self.local
    }

    /// Received a new remote value.
    pub(crate) fn receive(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Moves the presented transform towards the received one.
    pub(crate) fn advance(&mut self, dt: f32, rate: f32) {
        if self.local {
            self.smoothed = self.transform;
        } else {
            self.smoothed = self.smoothed.approach(self.transform, dt * rate);
        }
    }
}
