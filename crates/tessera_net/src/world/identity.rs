//! Monotonic id allocation on the coordinator.

use super::NetId;
use crate::error::{NetError, NetResult};

/// Hands out entity ids. Only the coordinator owns one.
///
/// The counter only moves forward, so an id is never issued twice and never
/// collides with a pre-placed id it has been seeded past.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: i32,
}

impl IdAllocator {
    /// Starts at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Next id [`IdAllocator::allocate`] would return.
    #[must_use]
    pub const fn peek(&self) -> NetId {
        NetId(self.next)
    }

    /// Advances the counter past `id`. Never moves it backwards.
    pub fn seed_past(&mut self, id: NetId) {
        if id.0 >= self.next {
            self.next = id.0.saturating_add(1);
        }
    }

    /// Returns a fresh id.
    ///
    /// # Errors
    ///
    /// [`NetError::IdsExhausted`] once the id space is used up.
    pub fn allocate(&mut self) -> NetResult<NetId> {
        if self.next == i32::MAX {
            return Err(NetError::IdsExhausted);
        }
        let id = NetId(self.next);
        self.next += 1;
        Ok(id)
    }
}
