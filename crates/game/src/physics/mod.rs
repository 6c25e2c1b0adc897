mod query;
mod world;

pub use query::{CollisionMask, CollisionQuery, Contact, RayHit, SweepHit, SweepShape};
pub use world::PhysicsWorld;
