//! Known peer endpoints of the coordinator.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::world::Endpoint;

/// Every endpoint that has sent the coordinator a datagram.
///
/// Entries are never evicted.
#[derive(Debug, Default)]
pub struct PeerSet {
    peers: Mutex<HashSet<Endpoint>>,
}

impl PeerSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `endpoint`; true if it was new.
    pub fn insert(&self, endpoint: Endpoint) -> bool {
        self.peers.lock().insert(endpoint)
    }

    /// Whether `endpoint` is known.
    #[must_use]
    pub fn contains(&self, endpoint: Endpoint) -> bool {
        self.peers.lock().contains(&endpoint)
    }

    /// Number of peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    /// True if no peer has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Copy of the current set, taken under the lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.peers.lock().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let peers = PeerSet::new();
        let a = Endpoint::new("127.0.0.1:4000".parse().unwrap());
        let b = Endpoint::new("127.0.0.1:4001".parse().unwrap());

        assert!(peers.insert(a));
        assert!(!peers.insert(a));
        assert!(peers.insert(b));
        assert_eq!(peers.len(), 2);
        assert!(peers.contains(b));
    }

    #[test]
    fn test_same_ip_different_port_is_distinct() {
        let peers = PeerSet::new();
        peers.insert(Endpoint::new("10.0.0.1:5000".parse().unwrap()));
        peers.insert(Endpoint::new("10.0.0.1:5001".parse().unwrap()));
        assert_eq!(peers.snapshot().len(), 2);
    }
}
