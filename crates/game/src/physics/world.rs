use glam::{Quat, Vec3};
use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::prelude::*;

use crate::world::ObjectId;

use super::{CollisionMask, CollisionQuery, Contact, RayHit, SweepHit, SweepShape};

const GROUND_HALF_SIZE: Real = 500.0;
const GROUND_HALF_THICKNESS: Real = 0.1;

pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, -9.81))
    }
}

impl PhysicsWorld {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            integration_parameters: IntegrationParameters::default(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: vector(gravity),
        }
    }

    pub fn gravity(&self) -> Vec3 {
        Vec3::new(self.gravity.x, self.gravity.y, self.gravity.z)
    }

    /// Advances the simulation by `dt`, split into at most `max_substeps` equal
    /// substeps of no more than `max_substep` seconds each. Returns the number
    /// of substeps taken.
    pub fn step(&mut self, dt: Real, max_substeps: u32, max_substep: Real) -> u32 {
        if dt <= 0.0 {
            return 0;
        }

        let substeps = ((dt / max_substep).ceil() as u32).clamp(1, max_substeps.max(1));
        let substep = (dt / substeps as Real).min(max_substep);
        self.integration_parameters.dt = substep;
        self.integration_parameters.min_ccd_dt = substep / 100.0;

        for _ in 0..substeps {
            self.pipeline.step(
                self.gravity,
                &self.integration_parameters,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                &(),
                &(),
            );
        }

        substeps
    }

    pub fn add_ground(&mut self, id: ObjectId) -> RigidBodyHandle {
        self.add_fixed_box(
            id,
            Vec3::new(0.0, 0.0, -GROUND_HALF_THICKNESS),
            Quat::IDENTITY,
            Vec3::new(GROUND_HALF_SIZE, GROUND_HALF_SIZE, GROUND_HALF_THICKNESS),
            CollisionMask::MAP | CollisionMask::SOLID,
        )
    }

    pub fn add_fixed_box(
        &mut self,
        id: ObjectId,
        position: Vec3,
        rotation: Quat,
        half_extents: Vec3,
        mask: CollisionMask,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::fixed()
            .translation(vector(position))
            .user_data(id as u128)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .friction(0.5)
            .restitution(0.0)
            .user_data(collider_user_data(id, mask))
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        self.set_body_pose(handle, position, rotation);
        handle
    }

    pub fn add_dynamic_box(
        &mut self,
        id: ObjectId,
        position: Vec3,
        rotation: Quat,
        half_extents: Vec3,
        mass: Real,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector(position))
            .angular_damping(1.0)
            .ccd_enabled(true)
            .user_data(id as u128)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .mass(mass)
            .friction(0.5)
            .restitution(0.0)
            .user_data(collider_user_data(id, CollisionMask::SOLID))
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        self.set_body_pose(handle, position, rotation);
        handle
    }

    pub fn add_dynamic_ball(
        &mut self,
        id: ObjectId,
        position: Vec3,
        radius: Real,
        mass: Real,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector(position))
            .ccd_enabled(true)
            .user_data(id as u128)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::ball(radius)
            .mass(mass)
            .friction(0.5)
            .restitution(0.3)
            .user_data(collider_user_data(id, CollisionMask::SOLID))
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    pub fn add_kinematic_box(
        &mut self,
        id: ObjectId,
        position: Vec3,
        half_extents: Vec3,
        mask: CollisionMask,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::kinematic_position_based()
            .translation(vector(position))
            .lock_rotations()
            .user_data(id as u128)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .friction(0.0)
            .user_data(collider_user_data(id, mask))
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        handle
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    pub fn contains(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn set_body_pose(&mut self, handle: RigidBodyHandle, position: Vec3, rotation: Quat) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let new_pose = Pose::from_parts(vector(position), rotation_of(rotation));
            body.set_position(new_pose, true);
        }
    }

    pub fn set_next_kinematic_pose(
        &mut self,
        handle: RigidBodyHandle,
        position: Vec3,
        rotation: Quat,
    ) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let new_pose = Pose::from_parts(vector(position), rotation_of(rotation));
            body.set_next_kinematic_position(new_pose);
        }
    }

    pub fn set_body_velocity(&mut self, handle: RigidBodyHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(vector(velocity), true);
        }
    }

    pub fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse(vector(impulse), true);
        }
    }

    pub fn body_pose(&self, handle: RigidBodyHandle) -> Option<(Vec3, Quat)> {
        self.bodies.get(handle).map(|b| {
            let t = b.translation();
            let r = b.rotation();
            (
                Vec3::new(t.x, t.y, t.z),
                Quat::from_xyzw(r.x, r.y, r.z, r.w).normalize(),
            )
        })
    }

    pub fn body_velocity(&self, handle: RigidBodyHandle) -> Option<Vec3> {
        self.bodies.get(handle).map(|b| {
            let v = b.linvel();
            Vec3::new(v.x, v.y, v.z)
        })
    }

    pub fn is_sleeping(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.get(handle).is_none_or(|b| b.is_sleeping())
    }

    /// Everything the body's colliders are currently touching.
    pub fn contacts(&self, handle: RigidBodyHandle) -> Vec<Contact> {
        let Some(body) = self.bodies.get(handle) else {
            return Vec::new();
        };

        let mut contacts = Vec::new();
        for &collider_handle in body.colliders() {
            for pair in self.narrow_phase.contact_pairs_with(collider_handle) {
                if pair.find_deepest_contact().is_none() {
                    continue;
                }

                let other = if pair.collider1 == collider_handle {
                    pair.collider2
                } else {
                    pair.collider1
                };

                if let Some(collider) = self.colliders.get(other) {
                    contacts.push(Contact {
                        other: collider_object(collider),
                        mask: collider_mask(collider),
                    });
                }
            }
        }
        contacts
    }

    fn with_query<R>(
        &self,
        mask: CollisionMask,
        exclude: Option<RigidBodyHandle>,
        f: impl FnOnce(&QueryPipeline<'_>) -> R,
    ) -> R {
        let predicate =
            |_: ColliderHandle, collider: &Collider| collider_mask(collider).intersects(mask);
        let mut filter = QueryFilter::default().predicate(&predicate);
        if let Some(handle) = exclude {
            filter = filter.exclude_rigid_body(handle);
        }

        let query = self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        );
        f(&query)
    }
}

impl CollisionQuery for PhysicsWorld {
    fn ray_cast(
        &self,
        from: Vec3,
        to: Vec3,
        mask: CollisionMask,
        exclude: Option<RigidBodyHandle>,
    ) -> Option<RayHit> {
        let delta = to - from;
        let length = delta.length();
        if length <= f32::EPSILON {
            return None;
        }
        let direction = delta / length;

        self.with_query(mask, exclude, |query| {
            let ray = Ray::new(vector(from), vector(direction));
            query
                .cast_ray(&ray, length, true)
                .map(|(_, toi)| RayHit {
                    point: from + direction * toi,
                    fraction: toi / length,
                })
        })
    }

    fn sweep_cast(
        &self,
        shape: &SweepShape,
        from: Vec3,
        to: Vec3,
        mask: CollisionMask,
        exclude: Option<RigidBodyHandle>,
    ) -> Option<SweepHit> {
        let shape = shared_shape(shape);
        let pose = Pose::from_parts(vector(from), Rotation::IDENTITY);
        let velocity = vector(to - from);
        let options = ShapeCastOptions {
            stop_at_penetration: false,
            ..ShapeCastOptions::with_max_time_of_impact(1.0)
        };

        self.with_query(mask, exclude, |query| {
            query
                .cast_shape(&pose, velocity, shape.as_ref(), options)
                .map(|(_, hit)| SweepHit {
                    fraction: hit.time_of_impact.clamp(0.0, 1.0),
                    normal: -Vec3::new(hit.normal1.x, hit.normal1.y, hit.normal1.z)
                        .normalize_or_zero(),
                })
        })
    }

    fn overlaps(
        &self,
        shape: &SweepShape,
        at: Vec3,
        mask: CollisionMask,
        exclude: Option<RigidBodyHandle>,
    ) -> bool {
        let shape = shared_shape(shape);
        let pose = Pose::from_parts(vector(at), Rotation::IDENTITY);

        self.with_query(mask, exclude, |query| {
            query.intersect_shape(pose, shape.as_ref()).next().is_some()
        })
    }
}

fn shared_shape(shape: &SweepShape) -> SharedShape {
    match *shape {
        SweepShape::Cuboid { half_extents } => {
            SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
        }
        SweepShape::Ball { radius } => SharedShape::ball(radius),
    }
}

fn vector(v: Vec3) -> Vector {
    Vector::new(v.x, v.y, v.z)
}

fn rotation_of(q: Quat) -> Rotation {
    Rotation::from_xyzw(q.x, q.y, q.z, q.w).normalize()
}

fn collider_user_data(id: ObjectId, mask: CollisionMask) -> u128 {
    (u128::from(mask.bits()) << 64) | u128::from(id)
}

fn collider_mask(collider: &Collider) -> CollisionMask {
    CollisionMask::from_bits_truncate((collider.user_data >> 64) as u32)
}

fn collider_object(collider: &Collider) -> Option<ObjectId> {
    let id = (collider.user_data & u128::from(u32::MAX)) as ObjectId;
    (id != 0).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substeps_are_capped() {
        let mut physics = PhysicsWorld::default();
        assert_eq!(physics.step(0.025, 4, 1.0 / 60.0), 2);
        assert_eq!(physics.step(0.01, 4, 1.0 / 60.0), 1);
        assert_eq!(physics.step(1.0, 4, 1.0 / 60.0), 4);
        assert_eq!(physics.step(0.0, 4, 1.0 / 60.0), 0);
    }

    #[test]
    fn ray_hits_ground_after_step() {
        let mut physics = PhysicsWorld::default();
        physics.add_ground(1);
        physics.step(1.0 / 60.0, 1, 1.0 / 60.0);

        let hit = physics
            .ray_cast(
                Vec3::new(0.0, 0.0, 5.0),
                Vec3::new(0.0, 0.0, -5.0),
                CollisionMask::SOLID,
                None,
            )
            .expect("ground below");
        assert!(hit.point.z.abs() < 1e-3);
        assert!((hit.fraction - 0.5).abs() < 1e-3);
    }

    #[test]
    fn masks_filter_queries() {
        let mut physics = PhysicsWorld::default();
        physics.add_kinematic_box(
            7,
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::ONE,
            CollisionMask::PLAYER,
        );
        physics.step(1.0 / 60.0, 1, 1.0 / 60.0);

        let from = Vec3::new(0.0, 0.0, 10.0);
        let to = Vec3::new(0.0, 0.0, -10.0);
        assert!(physics.ray_cast(from, to, CollisionMask::SOLID, None).is_none());
        assert!(physics.ray_cast(from, to, CollisionMask::PLAYER, None).is_some());
    }

    #[test]
    fn sweep_reports_fraction_and_normal() {
        let mut physics = PhysicsWorld::default();
        physics.add_fixed_box(
            3,
            Vec3::new(5.0, 0.0, 0.0),
            Quat::IDENTITY,
            Vec3::ONE,
            CollisionMask::SOLID,
        );
        physics.step(1.0 / 60.0, 1, 1.0 / 60.0);

        let shape = SweepShape::Cuboid {
            half_extents: Vec3::ONE,
        };
        let hit = physics
            .sweep_cast(
                &shape,
                Vec3::ZERO,
                Vec3::new(6.0, 0.0, 0.0),
                CollisionMask::SOLID,
                None,
            )
            .expect("box in the way");
        assert!((hit.fraction - 0.5).abs() < 0.01);
        assert!(hit.normal.x.abs() > 0.99);

        assert!(physics.overlaps(&shape, Vec3::new(4.5, 0.0, 0.0), CollisionMask::SOLID, None));
        assert!(!physics.overlaps(&shape, Vec3::ZERO, CollisionMask::SOLID, None));
    }

    #[test]
    fn sweep_out_of_penetration_is_clear() {
        let mut physics = PhysicsWorld::default();
        physics.add_fixed_box(
            3,
            Vec3::ZERO,
            Quat::IDENTITY,
            Vec3::ONE,
            CollisionMask::SOLID,
        );
        physics.step(1.0 / 60.0, 1, 1.0 / 60.0);

        let shape = SweepShape::Cuboid {
            half_extents: Vec3::ONE,
        };
        let from = Vec3::new(1.5, 0.0, 0.0);
        assert!(physics.overlaps(&shape, from, CollisionMask::SOLID, None));

        let leaving = physics.sweep_cast(&shape, from, Vec3::new(3.0, 0.0, 0.0), CollisionMask::SOLID, None);
        assert!(leaving.is_none());

        let entering = physics.sweep_cast(&shape, from, Vec3::ZERO, CollisionMask::SOLID, None);
        assert!(entering.is_some());
    }

    #[test]
    fn user_data_roundtrip() {
        let data = collider_user_data(42, CollisionMask::SOLID | CollisionMask::MAP);
        let collider = ColliderBuilder::ball(1.0).user_data(data).build();
        assert_eq!(collider_object(&collider), Some(42));
        assert_eq!(
            collider_mask(&collider),
            CollisionMask::SOLID | CollisionMask::MAP
        );
    }
}
