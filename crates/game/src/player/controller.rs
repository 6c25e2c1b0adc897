use glam::Vec3;
use rapier3d::prelude::RigidBodyHandle;

use crate::physics::{CollisionMask, CollisionQuery, SweepShape};
use crate::world::Transform;

use super::{PlayerConfig, PlayerState};

/// Kinematic movement for player objects: smoothed key input, a downward ground
/// ray, and swept collision with sliding against solid geometry.
pub struct PlayerController {
    config: PlayerConfig,
}

impl Default for PlayerController {
    fn default() -> Self {
        Self::new(PlayerConfig::default())
    }
}

impl PlayerController {
    pub fn new(config: PlayerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Advances one player by `dt`. Returns whether its state changed.
    pub fn update(
        &self,
        query: &impl CollisionQuery,
        body: Option<RigidBodyHandle>,
        transform: &mut Transform,
        state: &mut PlayerState,
        gravity: Vec3,
        dt: f32,
    ) -> bool {
        let start = transform.pos;

        self.tick_powers(state, dt);
        transform.hpr.x += self.config.turn_speed * dt * state.turn_power;

        let mut velocity = self.compute_velocity(state, transform.hpr.x, gravity, dt);
        let mut target = start + velocity * dt;

        state.resting = false;
        if let Some(hit) = query.ray_cast(
            target + Vec3::Z * self.config.ground_ray_up,
            target - Vec3::Z * self.config.ground_ray_down,
            CollisionMask::SOLID,
            body,
        ) {
            state.resting = true;
            velocity.z = 0.0;
            target.z = hit.point.z + self.config.foot_offset;
        }

        let end = self.sweep_and_slide(query, body, state, &mut velocity, start, target, dt);

        if velocity.length() < self.config.settle_speed {
            velocity = Vec3::ZERO;
            state.resting = true;
        }

        transform.pos = end;
        state.velocity = velocity;

        let dirty = state.turn_power != 0.0
            || state.motor_power != 0.0
            || state.look_dirty
            || end != start;
        state.look_dirty = false;
        dirty
    }

    fn tick_powers(&self, state: &mut PlayerState, dt: f32) {
        let intent = state.intent;
        let config = &self.config;

        state.turn_power = ramp(
            state.turn_power,
            intent.left,
            intent.right,
            dt / config.turn_accel_time,
            config.turn_damping,
            config.power_epsilon,
        );
        // No traction in the air.
        state.motor_power = if state.resting {
            ramp(
                state.motor_power,
                intent.forward,
                intent.backward,
                dt / config.walk_accel_time,
                config.motor_damping,
                config.power_epsilon,
            )
        } else {
            decay(state.motor_power, config.motor_damping, config.power_epsilon)
        };

        state.turn_power /= state.motor_power.abs() * config.turn_damper + 1.0;
    }

    fn compute_velocity(&self, state: &PlayerState, heading: f32, gravity: Vec3, dt: f32) -> Vec3 {
        let mut velocity = state.velocity + gravity * dt;

        if state.motor_power != 0.0 {
            let (sin, cos) = (heading + 90.0).to_radians().sin_cos();
            let speed = self.config.walk_speed * state.motor_power;
            velocity.x = cos * speed;
            velocity.y = sin * speed;
        } else {
            velocity.x = 0.0;
            velocity.y = 0.0;
        }

        velocity
    }

    #[allow(clippy::too_many_arguments)]
    fn sweep_and_slide(
        &self,
        query: &impl CollisionQuery,
        body: Option<RigidBodyHandle>,
        state: &mut PlayerState,
        velocity: &mut Vec3,
        start: Vec3,
        target: Vec3,
        dt: f32,
    ) -> Vec3 {
        let config = &self.config;
        let shape = SweepShape::Cuboid {
            half_extents: config.half_extents,
        };

        let mut from = start;
        let mut to = target;
        let mut hits = 0;

        loop {
            let Some(hit) = query.sweep_cast(&shape, from, to, CollisionMask::SOLID, body) else {
                return to;
            };
            hits += 1;

            let backed = from + (to - from) * (hit.fraction - config.backoff).max(0.0);
            if query.overlaps(&shape, backed, CollisionMask::SOLID, body) {
                state.diagnostics.backoff_overlaps += 1;
                log::warn!("Backed-off player position {backed} still overlaps solid geometry");
            }

            *velocity = -velocity.cross(hit.normal).cross(hit.normal);
            if velocity.z.abs() < config.resting_threshold {
                state.resting = true;
            }

            if hits > config.max_slide_attempts {
                state.diagnostics.retries_exhausted += 1;
                log::debug!("Slide retries exhausted, holding player at {backed}");
                return backed;
            }

            let remaining = (1.0 - hit.fraction - config.backoff).max(0.0);
            let slide = *velocity * dt * remaining;
            if remaining < config.no_room_fraction || slide.length() < config.no_room_fraction {
                state.diagnostics.slide_blocked += 1;
                log::debug!("No room to slide, holding player at {backed}");
                return backed;
            }

            from = backed;
            to = backed + slide;
        }
    }
}

/// Ramps `power` toward +1 or -1 while exactly one of the opposing keys is
/// held, otherwise decays it toward zero. Power of the opposite sign is dropped
/// before ramping.
fn ramp(power: f32, positive: bool, negative: bool, step: f32, damping: f32, epsilon: f32) -> f32 {
    match (positive, negative) {
        (true, false) => (power.max(0.0) + step).min(1.0),
        (false, true) => (power.min(0.0) - step).max(-1.0),
        _ => decay(power, damping, epsilon),
    }
}

fn decay(power: f32, damping: f32, epsilon: f32) -> f32 {
    let decayed = power / damping;
    if decayed.abs() < epsilon { 0.0 } else { decayed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{RayHit, SweepHit};

    /// Solid half-spaces behind planes `p . normal = offset`.
    struct Planes(Vec<(Vec3, f32)>);

    impl Planes {
        fn floor(height: f32) -> Self {
            Planes(vec![(Vec3::Z, height)])
        }
    }

    impl CollisionQuery for Planes {
        fn ray_cast(
            &self,
            from: Vec3,
            to: Vec3,
            _mask: CollisionMask,
            _exclude: Option<RigidBodyHandle>,
        ) -> Option<RayHit> {
            self.0
                .iter()
                .filter_map(|&(normal, offset)| {
                    let a = from.dot(normal) - offset;
                    let b = to.dot(normal) - offset;
                    (a >= 0.0 && b < 0.0).then(|| {
                        let fraction = a / (a - b);
                        let point = from + (to - from) * fraction;
                        // Land exactly on the plane.
                        let point = point - normal * (point.dot(normal) - offset);
                        RayHit { point, fraction }
                    })
                })
                .min_by(|x, y| x.fraction.total_cmp(&y.fraction))
        }

        fn sweep_cast(
            &self,
            shape: &SweepShape,
            from: Vec3,
            to: Vec3,
            _mask: CollisionMask,
            _exclude: Option<RigidBodyHandle>,
        ) -> Option<SweepHit> {
            let SweepShape::Cuboid { half_extents } = *shape else {
                return None;
            };

            self.0
                .iter()
                .filter_map(|&(normal, offset)| {
                    let reach = (half_extents * normal).abs().element_sum();
                    let a = from.dot(normal) - offset - reach;
                    let b = to.dot(normal) - offset - reach;
                    if a < 0.0 {
                        (b < a).then_some((0.0, normal))
                    } else if b < 0.0 {
                        Some((a / (a - b), normal))
                    } else {
                        None
                    }
                })
                .min_by(|x, y| x.0.total_cmp(&y.0))
                .map(|(fraction, normal)| SweepHit { fraction, normal })
        }

        fn overlaps(
            &self,
            shape: &SweepShape,
            at: Vec3,
            _mask: CollisionMask,
            _exclude: Option<RigidBodyHandle>,
        ) -> bool {
            let SweepShape::Cuboid { half_extents } = *shape else {
                return false;
            };
            self.0.iter().any(|&(normal, offset)| {
                let reach = (half_extents * normal).abs().element_sum();
                at.dot(normal) - offset - reach < 0.0
            })
        }
    }

    /// A floor the player stands on when its center is at z = 0.
    fn floor_under_origin() -> (Vec3, f32) {
        (Vec3::Z, -PlayerConfig::default().foot_offset)
    }

    fn standing() -> PlayerState {
        PlayerState {
            resting: true,
            ..PlayerState::new()
        }
    }

    fn at(pos: Vec3, heading: f32) -> Transform {
        Transform {
            pos,
            hpr: Vec3::new(heading, 0.0, 0.0),
        }
    }

    #[test]
    fn airborne_player_accelerates_by_gravity() {
        let controller = PlayerController::default();
        let world = Planes::floor(-1000.0);
        let mut transform = at(Vec3::new(0.0, 0.0, 50.0), 0.0);
        let mut state = PlayerState::new();
        let gravity = Vec3::new(0.0, 0.0, -9.81);
        let dt = 1.0 / 30.0;

        let mut previous = 0.0_f32;
        for _ in 0..10 {
            controller.update(&world, None, &mut transform, &mut state, gravity, dt);
            assert!(!state.resting);
            let delta = state.velocity.z.abs() - previous.abs();
            assert!((delta - 9.81 * dt).abs() < 1e-4);
            previous = state.velocity.z;
        }
    }

    #[test]
    fn player_lands_on_floor() {
        let controller = PlayerController::default();
        let world = Planes::floor(0.0);
        let mut transform = at(Vec3::new(0.0, 0.0, 1.6), 0.0);
        let mut state = PlayerState::new();

        let dirty = controller.update(
            &world,
            None,
            &mut transform,
            &mut state,
            Vec3::new(0.0, 0.0, -9.81),
            1.0 / 30.0,
        );

        assert!(dirty);
        assert!(state.resting);
        assert_eq!(state.velocity, Vec3::ZERO);
        assert!((transform.pos.z - 1.52).abs() < 1e-5);

        let dirty = controller.update(
            &world,
            None,
            &mut transform,
            &mut state,
            Vec3::new(0.0, 0.0, -9.81),
            1.0 / 30.0,
        );
        assert!(!dirty);
    }

    #[test]
    fn holding_forward_reaches_walk_speed() {
        let controller = PlayerController::default();
        let world = Planes(vec![floor_under_origin()]);
        let mut transform = at(Vec3::ZERO, 0.0);
        let mut state = standing();
        state.intent.forward = true;

        let config = controller.config();
        let dt = 1.0 / 40.0;
        let ticks = (config.walk_accel_time / dt).round() as usize;
        for _ in 0..ticks {
            controller.update(&world, None, &mut transform, &mut state, Vec3::ZERO, dt);
        }

        assert!((state.motor_power - 1.0).abs() < 1e-4);
        let planar = Vec3::new(state.velocity.x, state.velocity.y, 0.0).length();
        assert!((planar - config.walk_speed).abs() < 1e-3);
        assert!(transform.pos.y > 0.0);
    }

    #[test]
    fn released_keys_decay_power() {
        let controller = PlayerController::default();
        let world = Planes(Vec::new());
        let mut transform = at(Vec3::ZERO, 0.0);
        let mut state = PlayerState::new();
        state.motor_power = 1.0;
        state.turn_power = 0.5;

        for _ in 0..20 {
            controller.update(&world, None, &mut transform, &mut state, Vec3::ZERO, 1.0 / 30.0);
        }

        assert_eq!(state.motor_power, 0.0);
        assert_eq!(state.turn_power, 0.0);
        assert_eq!(state.velocity, Vec3::ZERO);
    }

    #[test]
    fn opposing_keys_cancel() {
        assert_eq!(ramp(0.0, true, true, 0.1, 1.5, 0.05), 0.0);
        assert!((ramp(0.0, true, false, 0.1, 1.5, 0.05) - 0.1).abs() < 1e-6);
        assert!((ramp(0.0, false, true, 0.1, 1.5, 0.05) + 0.1).abs() < 1e-6);
        assert_eq!(ramp(0.99, true, false, 0.1, 1.5, 0.05), 1.0);

        // Reversing drops the old direction instead of climbing back through it.
        assert!((ramp(-1.0, true, false, 0.1, 1.5, 0.05) - 0.1).abs() < 1e-6);
        assert!((ramp(1.0, false, true, 0.1, 1.5, 0.05) + 0.1).abs() < 1e-6);
    }

    #[test]
    fn reversing_reaches_full_speed_in_one_accel_time() {
        let controller = PlayerController::default();
        let world = Planes(vec![floor_under_origin()]);
        let mut transform = at(Vec3::ZERO, 0.0);
        let mut state = standing();
        state.motor_power = -1.0;
        state.intent.forward = true;

        let dt = 1.0 / 40.0;
        controller.update(&world, None, &mut transform, &mut state, Vec3::ZERO, dt);
        assert!(state.motor_power > 0.0);

        let ticks = (controller.config().walk_accel_time / dt).round() as usize;
        for _ in 1..ticks {
            controller.update(&world, None, &mut transform, &mut state, Vec3::ZERO, dt);
        }
        assert!((state.motor_power - 1.0).abs() < 1e-4);
    }

    #[test]
    fn motor_decays_while_airborne() {
        let controller = PlayerController::default();
        let world = Planes::floor(-1000.0);
        let mut transform = at(Vec3::new(0.0, 0.0, 50.0), 0.0);
        let mut state = PlayerState::new();
        state.intent.forward = true;
        state.motor_power = 1.0;

        let dt = 1.0 / 30.0;
        controller.update(&world, None, &mut transform, &mut state, Vec3::new(0.0, 0.0, -9.81), dt);
        assert!((state.motor_power - 1.0 / 1.5).abs() < 1e-6);

        for _ in 0..20 {
            controller.update(&world, None, &mut transform, &mut state, Vec3::new(0.0, 0.0, -9.81), dt);
        }
        assert_eq!(state.motor_power, 0.0);
        assert!(transform.pos.y < 2.0);
    }

    #[test]
    fn turning_is_damped_while_walking() {
        let controller = PlayerController::default();
        let world = Planes(Vec::new());
        let dt = 1.0 / 30.0;

        let mut idle = standing();
        idle.intent.left = true;
        let mut idle_at = at(Vec3::ZERO, 0.0);
        controller.update(&world, None, &mut idle_at, &mut idle, Vec3::ZERO, dt);

        let mut walking = standing();
        walking.intent.left = true;
        walking.intent.forward = true;
        let mut walking_at = at(Vec3::ZERO, 0.0);
        controller.update(&world, None, &mut walking_at, &mut walking, Vec3::ZERO, dt);

        assert!(idle_at.hpr.x > 0.0);
        assert!(walking_at.hpr.x < idle_at.hpr.x);
    }

    #[test]
    fn grazing_wall_slides_without_penetrating() {
        let controller = PlayerController::default();
        let normal = Vec3::NEG_X;
        let world = Planes(vec![(normal, -3.0), floor_under_origin()]);
        let mut transform = at(Vec3::new(1.95, 0.0, 0.0), -20.0);
        let mut state = standing();
        state.intent.forward = true;
        state.motor_power = 1.0;

        let dt = 1.0 / 30.0;
        for _ in 0..5 {
            controller.update(&world, None, &mut transform, &mut state, Vec3::ZERO, dt);

            assert!(state.velocity.dot(normal).abs() < 1e-4);
            let face = transform.pos.x + controller.config().half_extents.x;
            assert!(face <= 3.0 + controller.config().backoff);
        }

        assert!(transform.pos.y > 0.5);
        assert_eq!(state.diagnostics.backoff_overlaps, 0);
    }

    #[test]
    fn blocked_head_on_holds_position() {
        let controller = PlayerController::default();
        let world = Planes(vec![(Vec3::NEG_Y, -2.0), floor_under_origin()]);
        let mut transform = at(Vec3::new(0.0, 0.95, 0.0), 0.0);
        let mut state = standing();
        state.intent.forward = true;
        state.motor_power = 1.0;

        controller.update(&world, None, &mut transform, &mut state, Vec3::ZERO, 1.0 / 30.0);

        assert!(transform.pos.y + 1.0 <= 2.0);
        assert!(transform.pos.y >= 0.95);
        assert_eq!(state.velocity, Vec3::ZERO);
        assert_eq!(state.diagnostics.slide_blocked, 1);
    }

    #[test]
    fn wedge_exhausts_slide_retries() {
        let controller = PlayerController::default();
        let half = controller.config().half_extents;
        let gap = 0.001;
        let walls: Vec<(Vec3, f32)> = [Vec3::new(-1.0, -0.5, 0.0), Vec3::new(1.0, -0.5, 0.0)]
            .into_iter()
            .map(|normal| {
                let normal = normal.normalize();
                let reach = (half * normal).abs().element_sum();
                (normal, -(reach + gap))
            })
            .collect();
        let world = Planes(walls.clone());

        let mut transform = at(Vec3::ZERO, 0.0);
        let mut state = standing();
        state.intent.forward = true;
        state.motor_power = 1.0;

        controller.update(&world, None, &mut transform, &mut state, Vec3::ZERO, 1.0 / 30.0);

        assert_eq!(state.diagnostics.retries_exhausted, 1);
        assert_eq!(state.diagnostics.slide_blocked, 0);
        assert_eq!(state.diagnostics.backoff_overlaps, 0);
        assert!(transform.pos.length() < 0.01);
        for (normal, offset) in walls {
            let reach = (half * normal).abs().element_sum();
            assert!(transform.pos.dot(normal) - offset - reach >= 0.0);
        }
    }

    #[test]
    fn embedded_start_records_overlap() {
        let controller = PlayerController::default();
        let world = Planes(vec![(Vec3::NEG_Y, -2.0), floor_under_origin()]);
        let start = Vec3::new(0.0, 1.5, 0.0);
        let mut transform = at(start, 0.0);
        let mut state = standing();
        state.intent.forward = true;
        state.motor_power = 1.0;

        controller.update(&world, None, &mut transform, &mut state, Vec3::ZERO, 1.0 / 30.0);

        assert_eq!(state.diagnostics.backoff_overlaps, 1);
        assert_eq!(state.diagnostics.slide_blocked, 1);
        assert!((transform.pos.y - start.y).abs() < 1e-5);
    }
}
