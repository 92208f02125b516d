//! # Entity Table
//!
//! Slot storage plus an id index. Slots are never reused, so an
//! [`EntityKey`] handed to the scene stays valid for the whole session.

use std::collections::HashMap;

use tessera_shared::Transform;

use super::{EntityKey, NetEntity, NetId};
use crate::error::{NetError, NetResult};

/// All entities known to this process.
#[derive(Debug, Default)]
pub struct EntityTable {
    entities: Vec<NetEntity>,
    by_id: HashMap<NetId, EntityKey>,
}

impl EntityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities, bound or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when the table holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Adds an entity and indexes its id if it has one.
    ///
    /// # Errors
    ///
    /// [`NetError::DuplicateId`] if the id is already bound.
    pub fn insert(&mut self, entity: NetEntity) -> NetResult<EntityKey> {
        let id = entity.id;
        if id.is_assigned() && self.by_id.contains_key(&id) {
            return Err(NetError::DuplicateId(id));
        }

        let key = EntityKey(u32::try_from(self.entities.len()).map_err(|_| NetError::IdsExhausted)?);
        self.entities.push(entity);
        if id.is_assigned() {
            self.by_id.insert(id, key);
        }
        Ok(key)
    }

    /// Binds `id` to the entity in `key`, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// Fails on a negative id, an unknown key, or an id bound elsewhere.
    pub fn bind(&mut self, key: EntityKey, id: NetId) -> NetResult<()> {
        if !id.is_assigned() {
            return Err(NetError::InvalidId(id));
        }
        match self.by_id.get(&id) {
            Some(&bound) if bound == key => return Ok(()),
            Some(_) => return Err(NetError::DuplicateId(id)),
            None => {}
        }

        let entity = self.get_mut(key).ok_or(NetError::UnknownKey(key))?;
        let previous = std::mem::replace(&mut entity.id, id);
        if previous.is_assigned() {
            self.by_id.remove(&previous);
        }
        self.by_id.insert(id, key);
        Ok(())
    }

    /// Entity in a slot.
    #[must_use]
    pub fn get(&self, key: EntityKey) -> Option<&NetEntity> {
        self.entities.get(key.0 as usize)
    }

    /// Mutable entity in a slot.
    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut NetEntity> {
        self.entities.get_mut(key.0 as usize)
    }

    /// Slot holding `id`.
    #[must_use]
    pub fn key_of(&self, id: NetId) -> Option<EntityKey> {
        self.by_id.get(&id).copied()
    }

    /// Entity bound to `id`.
    #[must_use]
    pub fn find(&self, id: NetId) -> Option<&NetEntity> {
        self.key_of(id).and_then(|key| self.get(key))
    }

    /// Mutable entity bound to `id`.
    pub fn find_mut(&mut self, id: NetId) -> Option<&mut NetEntity> {
        let key = self.key_of(id)?;
        self.get_mut(key)
    }

    /// Iterates every entity in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &NetEntity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(slot, entity)| (EntityKey(slot as u32), entity))
    }

    /// Iterates entities that carry an id.
    pub fn bound(&self) -> impl Iterator<Item = &NetEntity> {
        self.entities.iter().filter(|entity| entity.id.is_assigned())
    }

    /// Highest bound id.
    #[must_use]
    pub fn max_id(&self) -> Option<NetId> {
        self.by_id.keys().copied().max()
    }

    /// First unbound passive entity.
    #[must_use]
    pub fn first_placeholder(&self) -> Option<EntityKey> {
        self.iter()
            .find(|(_, entity)| entity.is_placeholder())
            .map(|(key, _)| key)
    }

    /// First native, locally driven entity still waiting for an id.
    #[must_use]
    pub fn first_pending_native(&self) -> Option<EntityKey> {
        self.iter()
            .find(|(_, entity)| entity.native && entity.local && !entity.id.is_assigned())
            .map(|(key, _)| key)
    }

    /// Slots of every native entity still waiting for an id.
    #[must_use]
    pub fn pending_natives(&self) -> Vec<EntityKey> {
        self.iter()
            .filter(|(_, entity)| entity.native && !entity.id.is_assigned())
            .map(|(key, _)| key)
            .collect()
    }

    /// Writes the transform of a locally driven entity.
    ///
    /// # Errors
    ///
    /// Fails for unknown keys and for entities this process does not drive.
    pub fn set_transform(&mut self, key: EntityKey, transform: Transform) -> NetResult<()> {
        let entity = self.get_mut(key).ok_or(NetError::UnknownKey(key))?;
        if !entity.local {
            return Err(NetError::NotAuthoritative(key));
        }
        entity.transform = transform;
        entity.smoothed = transform;
        Ok(())
    }

    /// Advances smoothing of every entity by `dt` seconds.
    pub fn advance(&mut self, dt: f32, rate: f32) {
        for entity in &mut self.entities {
            entity.advance(dt, rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::EntityKind;

    fn passive(id: i32) -> NetEntity {
        NetEntity::passive(EntityKind::Remote, NetId(id), Transform::IDENTITY)
    }

    #[test]
    fn test_insert_indexes_ids() {
        let mut table = EntityTable::new();
        let a = table.insert(passive(4)).unwrap();
        let b = table.insert(passive(-1)).unwrap();

        assert_eq!(table.key_of(NetId(4)), Some(a));
        assert_eq!(table.len(), 2);
        assert_eq!(table.first_placeholder(), Some(b));
        assert_eq!(table.max_id(), Some(NetId(4)));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut table = EntityTable::new();
        table.insert(passive(4)).unwrap();
        assert!(matches!(table.insert(passive(4)), Err(NetError::DuplicateId(NetId(4)))));
    }

    #[test]
    fn test_bind_moves_index() {
        let mut table = EntityTable::new();
        let key = table.insert(passive(-1)).unwrap();
        table.bind(key, NetId(2)).unwrap();
        assert_eq!(table.find(NetId(2)).map(NetEntity::id), Some(NetId(2)));
        assert!(table.first_placeholder().is_none());

        let other = table.insert(passive(-1)).unwrap();
        assert!(matches!(table.bind(other, NetId(2)), Err(NetError::DuplicateId(_))));
        assert!(matches!(table.bind(other, NetId(-3)), Err(NetError::InvalidId(_))));
    }

    #[test]
    fn test_set_transform_requires_authority() {
        let mut table = EntityTable::new();
        let remote = table.insert(passive(1)).unwrap();
        let mine = table
            .insert(NetEntity::native(EntityKind::Player, NetId(2), Transform::IDENTITY))
            .unwrap();

        assert!(matches!(
            table.set_transform(remote, Transform::IDENTITY),
            Err(NetError::NotAuthoritative(_))
        ));
        assert!(table.set_transform(mine, Transform::IDENTITY).is_ok());
        assert!(matches!(
            table.set_transform(EntityKey(99), Transform::IDENTITY),
            Err(NetError::UnknownKey(_))
        ));
    }
}
