//! # Ownership Registry
//!
//! Per-entity write authority.
//!
//! ## Design
//!
//! On the coordinator the registry is the `owner` field of each entity:
//!
//! ```text
//!   owner = None      coordinator (or nobody) drives it; any peer may feed it
//!   owner = Some(p)   only datagrams from p are merged
//! ```
//!
//! Requests are first-writer-wins. A second endpoint asking for an entity
//! that is already owned is refused; the current owner asking again is
//! simply re-granted. Only the owner may release.
//!
//! Participants do not track owners. They flip their own `local` flag when
//! the coordinator says `OWNERSHIP_GRANTED` or `OWNERSHIP_RELEASED`.

use super::{Endpoint, EntityTable, NetId};
use crate::error::{NetError, NetResult};

/// Who writes an entity, as seen from this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnershipState {
    /// This process drives it.
    Local,
    /// A registered remote owner drives it.
    Remote(Endpoint),
    /// Driven elsewhere, no owner registered here.
    Unowned,
}

impl EntityTable {
    /// Ownership view of `id`, if bound.
    #[must_use]
    pub fn ownership(&self, id: NetId) -> Option<OwnershipState> {
        self.find(id).map(|entity| match (entity.local, entity.owner) {
            (true, _) => OwnershipState::Local,
            (false, Some(owner)) => OwnershipState::Remote(owner),
            (false, None) => OwnershipState::Unowned,
        })
    }

    /// Coordinator: records `requester` as the owner of `id`.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownEntity`] if `id` is not bound,
    /// [`NetError::AlreadyOwned`] if a different endpoint holds it.
    pub fn grant(&mut self, id: NetId, requester: Endpoint) -> NetResult<()> {
        let entity = self.find_mut(id).ok_or(NetError::UnknownEntity(id))?;
        match entity.owner {
            Some(owner) if owner != requester => Err(NetError::AlreadyOwned {
                id,
                owner,
                requester,
            }),
            _ => {
                entity.owner = Some(requester);
                entity.local = false;
                Ok(())
            }
        }
    }

    /// Coordinator: clears the owner of `id` if `sender` holds it.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownEntity`] if `id` is not bound,
    /// [`NetError::NotOwner`] if `sender` is not the registered owner.
    pub fn revoke(&mut self, id: NetId, sender: Endpoint) -> NetResult<()> {
        let entity = self.find_mut(id).ok_or(NetError::UnknownEntity(id))?;
        if entity.owner != Some(sender) {
            return Err(NetError::NotOwner {
                id,
                owner: entity.owner,
                sender,
            });
        }
        entity.owner = None;
        entity.local = entity.native;
        Ok(())
    }

    /// Participant: the coordinator granted us `id`.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownEntity`] if `id` is not bound.
    pub fn apply_granted(&mut self, id: NetId) -> NetResult<()> {
        let entity = self.find_mut(id).ok_or(NetError::UnknownEntity(id))?;
        entity.local = true;
        Ok(())
    }

    /// Participant: `id` went back to coordinator authority.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownEntity`] if `id` is not bound.
    pub fn apply_released(&mut self, id: NetId) -> NetResult<()> {
        let entity = self.find_mut(id).ok_or(NetError::UnknownEntity(id))?;
        entity.local = entity.native;
        if !entity.local {
            entity.smoothed = entity.transform;
        }
        Ok(())
    }
}
