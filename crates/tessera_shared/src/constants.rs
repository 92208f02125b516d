//! # Network Constants
//!
//! Defaults baked into every build. All of them can be overridden through
//! the runtime configuration of `tessera_net`.

/// UDP port for gameplay traffic (commands + transform batches).
pub const DEFAULT_GAMEPLAY_PORT: u16 = 9050;

/// UDP port for the discovery rendezvous.
///
/// Must differ from [`DEFAULT_GAMEPLAY_PORT`], both sockets bind on the same host.
pub const DEFAULT_DISCOVERY_PORT: u16 = 9051;

/// Fixed sleep between two iterations of a replication loop (~30 Hz).
pub const TICK_INTERVAL_MS: u64 = 33;

/// Bounded wait on every socket receive, so the cancel flag is rechecked.
pub const DISCOVERY_POLL_MS: u64 = 100;

/// How long a participant waits for a `SERVER_HERE` reply.
pub const DISCOVERY_TIMEOUT_MS: u64 = 3000;

/// Largest UDP payload deliverable in a single IPv4 datagram.
///
/// Batches above this size are dropped, never fragmented.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Where a freshly spawned local player appears.
pub const PLAYER_SPAWN: [f32; 3] = [0.0, 1.0, 0.0];
