//! Scene behaviours.
//!
//! Each behaviour is a function of its own elapsed time and parameters.
//! The clock only advances while this process drives the entity, so a
//! process that takes over authority resumes from its own phase and the
//! motion can jump.

use tessera_shared::constants::PLAYER_SPAWN;
use tessera_shared::{Quaternion, Transform, Vec3};

/// Slides between two points, back and forth.
#[derive(Clone, Copy, Debug)]
pub struct MovingWall {
    /// One end of the track.
    pub start: Vec3,
    /// Other end of the track.
    pub end: Vec3,
    /// Track lengths per second.
    pub speed: f32,
    elapsed: f32,
}

impl MovingWall {
    /// Creates a wall at `start`.
    #[must_use]
    pub const fn new(start: Vec3, end: Vec3, speed: f32) -> Self {
        Self {
            start,
            end,
            speed,
            elapsed: 0.0,
        }
    }

    /// Advances by `dt` seconds and returns the new transform.
    pub fn update(&mut self, current: Transform, dt: f32) -> Transform {
        self.elapsed += dt;
        Transform {
            position: self.start.lerp(self.end, ping_pong(self.elapsed * self.speed)),
            ..current
        }
    }
}

/// Triangle wave in `[0, 1]` with period 2.
#[must_use]
pub fn ping_pong(t: f32) -> f32 {
    let phase = t.rem_euclid(2.0);
    if phase > 1.0 {
        2.0 - phase
    } else {
        phase
    }
}

/// Swings around the X axis like a pendulum.
#[derive(Clone, Copy, Debug)]
pub struct SwingingHammer {
    /// Radians per second fed into the sine.
    pub speed: f32,
    /// Maximum swing angle in degrees.
    pub limit: f32,
    /// Phase offset in seconds.
    pub offset: f32,
    elapsed: f32,
}

impl SwingingHammer {
    /// Default swing speed.
    pub const SPEED: f32 = 1.5;
    /// Default swing limit in degrees.
    pub const LIMIT: f32 = 75.0;
    /// Upper bound of the random phase offset.
    pub const MAX_OFFSET: f32 = 10.0;

    /// Creates a hammer with an explicit phase.
    #[must_use]
    pub const fn new(speed: f32, limit: f32, offset: f32) -> Self {
        Self {
            speed,
            limit,
            offset,
            elapsed: 0.0,
        }
    }

    /// Creates a hammer with a random phase so neighbours do not swing in
    /// lockstep.
    #[must_use]
    pub fn with_random_phase(rng: &mut impl rand::Rng) -> Self {
        Self::new(Self::SPEED, Self::LIMIT, rng.gen_range(0.0..Self::MAX_OFFSET))
    }

    /// Current swing angle in degrees.
    #[must_use]
    pub fn angle(&self) -> f32 {
        ((self.elapsed + self.offset) * self.speed).sin() * self.limit
    }

    /// Advances by `dt` seconds and returns the new transform.
    pub fn update(&mut self, current: Transform, dt: f32) -> Transform {
        self.elapsed += dt;
        Transform {
            rotation: Quaternion::from_rotation_x(self.angle()),
            ..current
        }
    }
}

/// Walks the local player in a circle around its spawn point and puts it
/// back there if it ever falls below the kill plane.
#[derive(Clone, Copy, Debug)]
pub struct PlayerWalker {
    /// Respawn point.
    pub spawn: Vec3,
    /// Circle radius.
    pub radius: f32,
    /// Radians per second.
    pub angular_speed: f32,
    /// Anything below this height respawns.
    pub kill_y: f32,
    elapsed: f32,
}

impl PlayerWalker {
    /// Walker around the standard spawn point.
    #[must_use]
    pub fn new(radius: f32, angular_speed: f32) -> Self {
        Self {
            spawn: Vec3::from_array(PLAYER_SPAWN),
            radius,
            angular_speed,
            kill_y: -10.0,
            elapsed: 0.0,
        }
    }

    /// Spawn transform.
    #[must_use]
    pub const fn spawn_transform(&self) -> Transform {
        Transform::at(self.spawn)
    }

    /// Returns `current` unchanged, or the spawn transform if it fell below
    /// the kill plane.
    #[must_use]
    pub fn respawn_if_fallen(&self, current: Transform) -> Transform {
        if current.position.y < self.kill_y {
            tracing::info!(y = current.position.y, "player fell, respawning");
            self.spawn_transform()
        } else {
            current
        }
    }

    /// Advances by `dt` seconds and returns the new transform.
    pub fn update(&mut self, current: Transform, dt: f32) -> Transform {
        let current = self.respawn_if_fallen(current);
        self.elapsed += dt;
        let angle = self.elapsed * self.angular_speed;
        let offset = Vec3::new(angle.cos() * self.radius, 0.0, angle.sin() * self.radius);
        Transform {
            position: self.spawn + offset,
            rotation: Quaternion::from_rotation_y(-angle.to_degrees()),
            ..current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_pong() {
        assert!((ping_pong(0.25) - 0.25).abs() < 1e-6);
        assert!((ping_pong(1.5) - 0.5).abs() < 1e-6);
        assert!((ping_pong(2.25) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_wall_reverses_at_end() {
        let mut wall = MovingWall::new(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 1.0);
        let at_end = wall.update(Transform::IDENTITY, 1.0);
        assert!((at_end.position.x - 10.0).abs() < 1e-4);
        let back = wall.update(at_end, 0.5);
        assert!((back.position.x - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_hammer_stays_within_limit() {
        let mut hammer = SwingingHammer::new(SwingingHammer::SPEED, SwingingHammer::LIMIT, 3.0);
        for _ in 0..500 {
            hammer.update(Transform::IDENTITY, 0.033);
            assert!(hammer.angle().abs() <= SwingingHammer::LIMIT + 1e-3);
        }
    }

    #[test]
    fn test_random_phase_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let hammer = SwingingHammer::with_random_phase(&mut rng);
            assert!((0.0..SwingingHammer::MAX_OFFSET).contains(&hammer.offset));
        }
    }

    #[test]
    fn test_player_respawns_below_kill_plane() {
        let walker = PlayerWalker::new(3.0, 1.0);
        let fallen = Transform::at(Vec3::new(4.0, -50.0, 2.0));
        assert_eq!(walker.respawn_if_fallen(fallen).position, Vec3::new(0.0, 1.0, 0.0));

        let fine = Transform::at(Vec3::new(4.0, 0.5, 2.0));
        assert_eq!(walker.respawn_if_fallen(fine), fine);
    }

    #[test]
    fn test_player_walks_circle() {
        let mut walker = PlayerWalker::new(3.0, 1.0);
        let moved = walker.update(walker.spawn_transform(), 0.5);
        assert!((moved.position.distance(walker.spawn) - 3.0).abs() < 1e-4);
    }
}
