//! Remote actor bookkeeping.

use std::sync::Arc;

use parking_lot::Mutex;
use tessera_net::{ActorFactory, EntityKey, EntityKind, NetEntity, NetId};

/// An entity some other process introduced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteActor {
    /// Local slot.
    pub key: EntityKey,
    /// Network id.
    pub id: NetId,
    /// Adopted placeholder kind, or `Remote` for fresh entities.
    pub kind: EntityKind,
}

/// Records every remote actor the network introduces.
///
/// Cloning shares the same list, so the scene can keep one handle while the
/// session owns the other.
#[derive(Clone, Debug, Default)]
pub struct ActorRegistry {
    actors: Arc<Mutex<Vec<RemoteActor>>>,
}

impl ActorRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of remote actors seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.lock().len()
    }

    /// True before the first remote actor.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.lock().is_empty()
    }

    /// Copy of the list.
    #[must_use]
    pub fn actors(&self) -> Vec<RemoteActor> {
        self.actors.lock().clone()
    }
}

impl ActorFactory for ActorRegistry {
    fn spawn_remote(&mut self, key: EntityKey, entity: &NetEntity) {
        tracing::info!(id = %entity.id(), kind = ?entity.kind(), "remote actor joined the scene");
        self.actors.lock().push(RemoteActor {
            key,
            id: entity.id(),
            kind: entity.kind(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_net::{Endpoint, MergeMode, TransformRecord, World};
    use tessera_shared::Transform;

    #[test]
    fn test_registry_sees_world_joins() {
        let registry = ActorRegistry::new();
        let mut world = World::new(Box::new(registry.clone()), 10.0);
        let peer = Endpoint::new("127.0.0.1:9050".parse().unwrap());

        let batch = [
            TransformRecord::new(NetId(3), Transform::IDENTITY),
            TransformRecord::new(NetId(4), Transform::IDENTITY),
        ];
        world.merge_batch(&batch, peer, MergeMode::Participant);
        world.merge_batch(&batch, peer, MergeMode::Participant);

        let ids: Vec<_> = registry.actors().iter().map(|actor| actor.id).collect();
        assert_eq!(ids, vec![NetId(3), NetId(4)]);
        assert!(registry.actors().iter().all(|actor| actor.kind == EntityKind::Remote));
    }
}
