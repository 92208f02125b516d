//! # Demo Scene
//!
//! ```text
//!   id 1   MovingWall      (-4,1,6) <-> (4,1,6)
//!   id 2   SwingingHammer  (-3,4,0)
//!   id 3   SwingingHammer  ( 3,4,0)
//!   --     Player          spawn (0,1,0), id from the coordinator
//! ```
//!
//! Level objects carry fixed ids so every process agrees on them without
//! negotiation. A behaviour only runs while its entity is driven locally,
//! so a participant that gains ownership of the wall takes over its motion
//! and the coordinator stops writing it.

use tessera_net::{EntityKey, EntityKind, NetId, NetResult, Role, Session};
use tessera_shared::{Transform, Vec3};

use crate::behaviours::{MovingWall, PlayerWalker, SwingingHammer};

/// Fixed id of the wall.
pub const WALL_ID: NetId = NetId(1);
/// Fixed ids of the hammers.
pub const HAMMER_IDS: [NetId; 2] = [NetId(2), NetId(3)];

/// Placement parameters.
#[derive(Clone, Copy, Debug)]
pub struct SceneLayout {
    /// Wall track start.
    pub wall_start: Vec3,
    /// Wall track end.
    pub wall_end: Vec3,
    /// Hammer pivots.
    pub hammers: [Vec3; 2],
    /// Player circle radius.
    pub walk_radius: f32,
}

impl Default for SceneLayout {
    fn default() -> Self {
        Self {
            wall_start: Vec3::new(-4.0, 1.0, 6.0),
            wall_end: Vec3::new(4.0, 1.0, 6.0),
            hammers: [Vec3::new(-3.0, 4.0, 0.0), Vec3::new(3.0, 4.0, 0.0)],
            walk_radius: 3.0,
        }
    }
}

enum Behaviour {
    Wall(MovingWall),
    Hammer(SwingingHammer),
    Player(PlayerWalker),
}

struct Driven {
    key: EntityKey,
    behaviour: Behaviour,
}

/// The scene's behaviours, bound to session entities.
pub struct Scene {
    driven: Vec<Driven>,
    player: Option<EntityKey>,
}

impl Scene {
    /// Places the level objects and, for participating roles, the local
    /// player. Call before `Session::start`.
    ///
    /// # Errors
    ///
    /// Propagates id conflicts from the session.
    pub fn build(session: &mut Session, layout: SceneLayout) -> NetResult<Self> {
        let mut rng = rand::thread_rng();
        let mut driven = Vec::new();

        let wall = session.place(EntityKind::LevelObject, Transform::at(layout.wall_start), WALL_ID)?;
        driven.push(Driven {
            key: wall,
            behaviour: Behaviour::Wall(MovingWall::new(layout.wall_start, layout.wall_end, 1.0)),
        });

        for (pivot, id) in layout.hammers.into_iter().zip(HAMMER_IDS) {
            let key = session.place(EntityKind::LevelObject, Transform::at(pivot), id)?;
            driven.push(Driven {
                key,
                behaviour: Behaviour::Hammer(SwingingHammer::with_random_phase(&mut rng)),
            });
        }

        let player = if session.role() == Role::Server {
            None
        } else {
            let walker = PlayerWalker::new(layout.walk_radius, 0.8);
            let key = session.spawn_local(EntityKind::Player, walker.spawn_transform())?;
            driven.push(Driven {
                key,
                behaviour: Behaviour::Player(walker),
            });
            Some(key)
        };

        tracing::info!(driven = driven.len(), "scene ready");
        Ok(Self { driven, player })
    }

    /// Local player, if this role has one.
    #[must_use]
    pub const fn player(&self) -> Option<EntityKey> {
        self.player
    }

    /// Advances every behaviour whose entity this process drives. Returns
    /// how many entities were written.
    pub fn update(&mut self, session: &mut Session, dt: f32) -> usize {
        let mut written = 0;
        for driven in &mut self.driven {
            let Some(entity) = session.world().entity(driven.key) else {
                continue;
            };
            if !entity.is_local() {
                continue;
            }

            let current = entity.transform();
            let next = match &mut driven.behaviour {
                Behaviour::Wall(wall) => wall.update(current, dt),
                Behaviour::Hammer(hammer) => hammer.update(current, dt),
                Behaviour::Player(walker) => walker.update(current, dt),
            };
            if session.set_transform(driven.key, next).is_ok() {
                written += 1;
            }
        }
        written
    }
}
