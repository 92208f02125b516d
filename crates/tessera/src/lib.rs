//! # Tessera
//!
//! A small replicated scene on top of [`tessera_net`]: a sliding wall, two
//! swinging hammers and one player per participant.
//!
//! ## Modules
//!
//! - [`behaviours`]: deterministic motion for level objects and players
//! - [`actors`]: the [`ActorFactory`](tessera_net::ActorFactory) that
//!   records entities the network introduces
//! - [`scene`]: wires behaviours to session entities and drives them each
//!   frame, but only while this process holds authority

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod actors;
pub mod behaviours;
pub mod scene;

pub use actors::{ActorRegistry, RemoteActor};
pub use behaviours::{MovingWall, PlayerWalker, SwingingHammer};
pub use scene::{Scene, SceneLayout};
