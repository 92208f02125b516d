//! # Tessera Shared
//!
//! Common types used by the coordinator and by every participant.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER open a socket or spawn a thread. It is pure data:
//! - [`math`]: the transform types replicated on the wire
//! - [`constants`]: ports, tick pacing and datagram limits

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{
    DEFAULT_DISCOVERY_PORT, DEFAULT_GAMEPLAY_PORT, DISCOVERY_POLL_MS, DISCOVERY_TIMEOUT_MS,
    MAX_DATAGRAM_SIZE, TICK_INTERVAL_MS,
};
pub use math::{Quaternion, Transform, Vec3};
