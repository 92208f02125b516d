//! # World State
//!
//! The entity table plus everything that mutates it.
//!
//! ## Design
//!
//! A [`World`] is only ever touched from the coordinator context, either
//! directly by the scene or through actions drained from the
//! [`Dispatcher`](crate::dispatcher::Dispatcher). That makes it the single
//! writer of entity state: two batches racing to introduce the same unknown
//! id are applied one after the other, and the second finds the entity the
//! first created.
//!
//! ## Merge rules
//!
//! ```text
//! id < 0                              ignored
//! unknown id                          adopt a placeholder or create, then apply
//! entity driven locally               rejected
//! coordinator, owner == sender/None   applied
//! coordinator, owner != sender        rejected
//! participant                         applied
//! ```

mod entity;
mod identity;
mod ownership;
mod table;

pub use entity::{Endpoint, EntityKey, EntityKind, NetEntity, NetId};
pub use identity::IdAllocator;
pub use ownership::OwnershipState;
pub use table::EntityTable;

use tessera_shared::Transform;
use tracing::{debug, info};

use crate::error::{NetError, NetResult};
use crate::protocol::TransformRecord;
use crate::replication::{Replica, WorldSnapshot};

/// Builds the scene-side representation of entities the wire introduced.
///
/// Called in the coordinator context after the entity is in the table, so
/// the factory may look it up by key.
pub trait ActorFactory: Send {
    /// A remote entity appeared under `key`.
    fn spawn_remote(&mut self, key: EntityKey, entity: &NetEntity);
}

/// Factory that builds nothing. Headless coordinators use it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFactory;

impl ActorFactory for NullFactory {
    fn spawn_remote(&mut self, _key: EntityKey, _entity: &NetEntity) {}
}

/// Which acceptance rules a merge follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeMode {
    /// Batches received by the coordinator loop; owners are enforced.
    Coordinator,
    /// Batches received from the coordinator.
    Participant,
}

/// Outcome counts of one merged batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Existing entities updated.
    pub applied: usize,
    /// Entities created for unknown ids.
    pub created: usize,
    /// Placeholders bound to unknown ids.
    pub adopted: usize,
    /// Records refused by ownership rules.
    pub rejected: usize,
    /// Records with negative ids.
    pub ignored: usize,
}

impl MergeSummary {
    /// Records that changed state.
    #[must_use]
    pub const fn accepted(&self) -> usize {
        self.applied + self.created + self.adopted
    }
}

enum RecordOutcome {
    Applied,
    Created,
    Adopted,
    Rejected,
    Ignored,
}

/// The replicated world of one process.
pub struct World {
    table: EntityTable,
    ids: IdAllocator,
    factory: Box<dyn ActorFactory>,
    smoothing_rate: f32,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new(factory: Box<dyn ActorFactory>, smoothing_rate: f32) -> Self {
        Self {
            table: EntityTable::new(),
            ids: IdAllocator::new(),
            factory,
            smoothing_rate,
        }
    }

    /// Read access to the table.
    #[must_use]
    pub const fn table(&self) -> &EntityTable {
        &self.table
    }

    /// Mutable access to the table (ownership operations).
    pub fn table_mut(&mut self) -> &mut EntityTable {
        &mut self.table
    }

    /// Entity in a slot.
    #[must_use]
    pub fn entity(&self, key: EntityKey) -> Option<&NetEntity> {
        self.table.get(key)
    }

    /// Adds an entity this process drives.
    ///
    /// # Errors
    ///
    /// [`NetError::DuplicateId`] if `id` is already bound.
    pub fn insert_native(&mut self, kind: EntityKind, transform: Transform, id: NetId) -> NetResult<EntityKey> {
        let key = self.table.insert(NetEntity::native(kind, id, transform))?;
        self.ids.seed_past(id);
        Ok(key)
    }

    /// Adds an entity someone else drives; an unassigned id makes it a
    /// placeholder.
    ///
    /// # Errors
    ///
    /// [`NetError::DuplicateId`] if `id` is already bound.
    pub fn insert_passive(&mut self, kind: EntityKind, transform: Transform, id: NetId) -> NetResult<EntityKey> {
        let key = self.table.insert(NetEntity::passive(kind, id, transform))?;
        self.ids.seed_past(id);
        Ok(key)
    }

    /// Advances the id counter past every bound id.
    pub fn seed_ids(&mut self) {
        if let Some(max) = self.table.max_id() {
            self.ids.seed_past(max);
        }
    }

    /// Next id the allocator would issue.
    #[must_use]
    pub const fn next_id(&self) -> NetId {
        self.ids.peek()
    }

    /// Issues a fresh id.
    ///
    /// # Errors
    ///
    /// [`NetError::IdsExhausted`].
    pub fn allocate_id(&mut self) -> NetResult<NetId> {
        self.ids.allocate()
    }

    /// Allocates and binds an id for the entity in `key`.
    ///
    /// # Errors
    ///
    /// Allocation or binding failure.
    pub fn assign_id(&mut self, key: EntityKey) -> NetResult<NetId> {
        let id = self.ids.allocate()?;
        self.table.bind(key, id)?;
        Ok(id)
    }

    /// Gives an id to every native entity created before the session
    /// started. Returns how many were bound.
    ///
    /// # Errors
    ///
    /// Allocation or binding failure.
    pub fn assign_pending(&mut self) -> NetResult<usize> {
        let pending = self.table.pending_natives();
        for &key in &pending {
            let id = self.assign_id(key)?;
            debug!(?key, %id, "bound pending entity");
        }
        Ok(pending.len())
    }

    /// Participant: binds an `ASSIGN_ID` to the oldest local entity
    /// still waiting for one.
    ///
    /// # Errors
    ///
    /// [`NetError::NoPendingEntity`] if nothing is waiting, or a binding
    /// failure.
    pub fn accept_assigned(&mut self, id: NetId) -> NetResult<EntityKey> {
        let key = self
            .table
            .first_pending_native()
            .ok_or(NetError::NoPendingEntity(id))?;
        self.table.bind(key, id)?;
        info!(?key, %id, "local entity bound");
        Ok(key)
    }

    /// Writes the transform of a locally driven entity.
    ///
    /// # Errors
    ///
    /// See [`EntityTable::set_transform`].
    pub fn set_transform(&mut self, key: EntityKey, transform: Transform) -> NetResult<()> {
        self.table.set_transform(key, transform)
    }

    /// Merges one received batch.
    pub fn merge_batch(&mut self, records: &[TransformRecord], sender: Endpoint, mode: MergeMode) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for record in records {
            match self.merge_record(record, sender, mode) {
                RecordOutcome::Applied => summary.applied += 1,
                RecordOutcome::Created => summary.created += 1,
                RecordOutcome::Adopted => summary.adopted += 1,
                RecordOutcome::Rejected => summary.rejected += 1,
                RecordOutcome::Ignored => summary.ignored += 1,
            }
        }
        if summary.rejected > 0 {
            debug!(%sender, rejected = summary.rejected, "records refused by ownership rules");
        }
        summary
    }

    fn merge_record(&mut self, record: &TransformRecord, sender: Endpoint, mode: MergeMode) -> RecordOutcome {
        let id = record.net_id();
        if !id.is_assigned() {
            return RecordOutcome::Ignored;
        }

        if let Some(entity) = self.table.find_mut(id) {
            let accepted = !entity.local
                && match mode {
                    MergeMode::Coordinator => entity.owner.map_or(true, |owner| owner == sender),
                    MergeMode::Participant => true,
                };
            if !accepted {
                return RecordOutcome::Rejected;
            }
            entity.receive(record.transform);
            return RecordOutcome::Applied;
        }

        match self.introduce(id, record.transform, sender, mode) {
            Ok(outcome) => outcome,
            Err(error) => {
                debug!(%id, %error, "could not introduce entity");
                RecordOutcome::Rejected
            }
        }
    }

    /// First sighting of `id`: adopt a placeholder or create a new entity.
    fn introduce(&mut self, id: NetId, transform: Transform, sender: Endpoint, mode: MergeMode) -> NetResult<RecordOutcome> {
        let (key, outcome) = match self.table.first_placeholder() {
            Some(key) => {
                self.table.bind(key, id)?;
                (key, RecordOutcome::Adopted)
            }
            None => {
                let key = self.table.insert(NetEntity::passive(EntityKind::Remote, id, transform))?;
                (key, RecordOutcome::Created)
            }
        };
        self.ids.seed_past(id);

        let entity = self.table.get_mut(key).ok_or(NetError::UnknownKey(key))?;
        entity.transform = transform;
        entity.smoothed = transform;
        if mode == MergeMode::Coordinator {
            entity.owner = Some(sender);
        }
        info!(%id, ?key, %sender, "remote entity joined");

        self.factory.spawn_remote(key, entity);
        Ok(outcome)
    }

    /// Advances passive smoothing.
    pub fn advance(&mut self, dt: f32) {
        self.table.advance(dt, self.smoothing_rate);
    }

    /// Copies every bound entity into an immutable snapshot.
    #[must_use]
    pub fn snapshot(&self, tick: u64) -> WorldSnapshot {
        WorldSnapshot {
            tick,
            replicas: self
                .table
                .bound()
                .map(|entity| Replica {
                    id: entity.id,
                    transform: entity.transform,
                    local: entity.local,
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.table.len())
            .field("next_id", &self.ids.peek())
            .finish_non_exhaustive()
    }
}
