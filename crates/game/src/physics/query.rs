use bitflags::bitflags;
use glam::Vec3;
use rapier3d::dynamics::RigidBodyHandle;

use crate::world::ObjectId;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CollisionMask: u32 {
        const MAP = 1 << 0;
        const SOLID = 1 << 1;
        const GHOST = 1 << 2;
        const PLAYER = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    /// Fraction of the way from the ray origin to its end point.
    pub fraction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    /// Fraction of the sweep travelled before first contact, in `[0, 1]`.
    pub fraction: f32,
    /// Surface normal at the contact, unit length.
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepShape {
    Cuboid { half_extents: Vec3 },
    Ball { radius: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub other: Option<ObjectId>,
    pub mask: CollisionMask,
}

/// The read-only collision capability the character controller moves against.
pub trait CollisionQuery {
    fn ray_cast(
        &self,
        from: Vec3,
        to: Vec3,
        mask: CollisionMask,
        exclude: Option<RigidBodyHandle>,
    ) -> Option<RayHit>;

    /// First hit of `shape` moving from `from` to `to`. A shape that starts
    /// out penetrating only reports a hit if the motion goes deeper.
    fn sweep_cast(
        &self,
        shape: &SweepShape,
        from: Vec3,
        to: Vec3,
        mask: CollisionMask,
        exclude: Option<RigidBodyHandle>,
    ) -> Option<SweepHit>;

    fn overlaps(
        &self,
        shape: &SweepShape,
        at: Vec3,
        mask: CollisionMask,
        exclude: Option<RigidBodyHandle>,
    ) -> bool;
}
