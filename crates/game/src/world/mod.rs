mod object;

pub use object::{
    FLUID_DURATION, GRENADE_MASS, GRENADE_RADIUS, Incarnator, ObjectId, ObjectKind, ObjectRecord,
    ObjectState, StateMap, Transform, WorldObject, hpr_to_quat, quat_to_hpr, ramp_rotation,
    records_from_value, records_to_value, states_from_value, states_to_value,
};

use std::collections::BTreeMap;

use glam::Vec3;
use rand::Rng;

use crate::net::ServerEvent;
use crate::physics::{CollisionMask, PhysicsWorld};
use crate::player::{PlayerConfig, PlayerController};

/// Grenades throw every dynamic block within this radius.
pub const BLAST_RADIUS: f32 = 10.0;
pub const BLAST_FORCE: f32 = 20000.0;

const GRENADE_LAUNCH_DISTANCE: f32 = 2.0;
const GRENADE_LAUNCH_SPEED: f32 = 30.0;
const HEAD_HEIGHT: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub substeps: u32,
    pub max_substep: f32,
    pub gravity: Vec3,
    pub player: PlayerConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            substeps: 4,
            max_substep: 1.0 / 60.0,
            gravity: Vec3::new(0.0, 0.0, -9.81),
            player: PlayerConfig::default(),
        }
    }
}

/// The authoritative object table plus the physics it is simulated in.
pub struct World {
    objects: BTreeMap<ObjectId, WorldObject>,
    physics: PhysicsWorld,
    controller: PlayerController,
    substeps: u32,
    max_substep: f32,
    gravity: Vec3,
    frame: u64,
    next_id: ObjectId,
    incarnators: Vec<Incarnator>,
    outbox: Vec<ServerEvent>,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            objects: BTreeMap::new(),
            physics: PhysicsWorld::new(config.gravity),
            controller: PlayerController::new(config.player),
            substeps: config.substeps,
            max_substep: config.max_substep,
            gravity: config.gravity,
            frame: 0,
            next_id: 1,
            incarnators: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn player_config(&self) -> &PlayerConfig {
        self.controller.config()
    }

    pub fn get(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut WorldObject> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.values()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn find_player(&self, pid: u32) -> Option<ObjectId> {
        self.objects
            .iter()
            .find(|(_, object)| object.pid() == Some(pid))
            .map(|(&id, _)| id)
    }

    pub fn incarnators(&self) -> &[Incarnator] {
        &self.incarnators
    }

    pub fn add_incarnator(&mut self, incarnator: Incarnator) {
        self.incarnators.push(incarnator);
    }

    pub fn random_incarnator(&self, rng: &mut impl Rng) -> Incarnator {
        if self.incarnators.is_empty() {
            return Incarnator::default();
        }
        self.incarnators[rng.gen_range(0..self.incarnators.len())]
    }

    /// Registers `object`, assigning a fresh id unless it already carries one.
    /// An object arriving with an id replaces whatever held that id before.
    pub fn attach(&mut self, mut object: WorldObject) -> ObjectId {
        let id = match object.world_id {
            Some(id) => {
                if id >= self.next_id {
                    self.next_id = id + 1;
                }
                self.remove(id);
                id
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                object.world_id = Some(id);
                id
            }
        };

        self.setup(id, &mut object);
        log::debug!("Attached {} #{id} ({})", object.kind.name(), object.name);
        self.objects.insert(id, object);
        id
    }

    fn setup(&mut self, id: ObjectId, object: &mut WorldObject) {
        let pos = object.transform.pos;
        let rotation = object.transform.rotation();
        let physics = &mut self.physics;

        let body = match object.kind {
            ObjectKind::Ground => physics.add_ground(id),
            ObjectKind::Block { size, mass, .. } if mass > 0.0 => {
                physics.add_dynamic_box(id, pos, rotation, size * 0.5, mass)
            }
            ObjectKind::Block { size, .. } => physics.add_fixed_box(
                id,
                pos,
                rotation,
                size * 0.5,
                CollisionMask::MAP | CollisionMask::SOLID,
            ),
            ObjectKind::Ramp {
                base,
                top,
                width,
                thickness,
                ..
            } => physics.add_fixed_box(
                id,
                pos,
                rotation,
                Vec3::new(width * 0.5, (top - base).length() * 0.5, thickness * 0.5),
                CollisionMask::MAP | CollisionMask::SOLID,
            ),
            ObjectKind::Player { .. } => physics.add_kinematic_box(
                id,
                pos,
                self.controller.config().half_extents,
                CollisionMask::PLAYER,
            ),
            ObjectKind::Grenade { mass, .. } => {
                let body = physics.add_dynamic_ball(id, pos, GRENADE_RADIUS, mass);
                physics.set_body_velocity(body, object.velocity);
                body
            }
        };
        object.body = Some(body);
    }

    /// Unregisters an object and releases its physics body. Missing ids are ignored.
    pub fn remove(&mut self, id: ObjectId) -> Option<WorldObject> {
        let mut object = self.objects.remove(&id)?;
        if let Some(body) = object.body.take() {
            self.physics.remove_body(body);
        }
        log::debug!("Removed {} #{id}", object.kind.name());
        Some(object)
    }

    pub fn queue_event(&mut self, event: ServerEvent) {
        self.outbox.push(event);
    }

    /// Runs one simulation frame and returns everything that needs broadcasting:
    /// queued events first, then one batched `state` event if anything moved.
    pub fn tick(&mut self, dt: f32) -> Vec<ServerEvent> {
        self.frame += 1;
        self.physics.step(dt, self.substeps, self.max_substep);

        let ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        let mut states = StateMap::new();
        let mut blasts = Vec::new();

        for id in ids {
            let Some(object) = self.objects.get_mut(&id) else {
                continue;
            };

            let dirty = match object.kind {
                ObjectKind::Player { .. } => {
                    let (Some(body), Some(player)) = (object.body, object.player.as_mut()) else {
                        continue;
                    };
                    let dirty = self.controller.update(
                        &self.physics,
                        Some(body),
                        &mut object.transform,
                        player,
                        self.gravity,
                        dt,
                    );
                    object.velocity = player.velocity;
                    self.physics.set_next_kinematic_pose(
                        body,
                        object.transform.pos,
                        object.transform.rotation(),
                    );
                    dirty
                }
                ObjectKind::Block { mass, .. } if mass > 0.0 => {
                    sync_dynamic(&self.physics, object)
                }
                ObjectKind::Grenade { owner, .. } => {
                    let dirty = sync_dynamic(&self.physics, object);
                    let detonated = object.body.is_some_and(|body| {
                        self.physics
                            .contacts(body)
                            .iter()
                            .any(|contact| contact.other != owner && contact.other != Some(id))
                    });
                    if detonated {
                        blasts.push((id, object.transform.pos));
                    }
                    dirty
                }
                _ => false,
            };

            if dirty {
                states.insert(id, object.state(self.controller.config()));
            }
        }

        if !blasts.is_empty() {
            let mut removed = Vec::with_capacity(blasts.len());
            for (id, center) in blasts {
                self.remove(id);
                states.remove(&id);
                removed.push(id);
                self.blast(center);
            }
            self.queue_event(ServerEvent::Removed { world_ids: removed });
        }

        let mut events = std::mem::take(&mut self.outbox);
        if !states.is_empty() {
            events.push(ServerEvent::State {
                frame: self.frame,
                state: states,
            });
        }
        events
    }

    fn blast(&mut self, center: Vec3) {
        log::debug!("Grenade detonated at {center}");
        for object in self.objects.values() {
            if !matches!(object.kind, ObjectKind::Block { mass, .. } if mass > 0.0) {
                continue;
            }
            let Some(body) = object.body else {
                continue;
            };

            let offset = object.transform.pos - center;
            let distance = offset.length();
            if distance > BLAST_RADIUS {
                continue;
            }
            let distance = distance.max(1.0);
            self.physics
                .apply_impulse(body, offset * BLAST_FORCE / (distance * distance));
        }
    }

    /// Launches a grenade from the player's head along its look direction.
    pub fn fire(&mut self, player_id: ObjectId) -> Option<ObjectId> {
        let object = self.objects.get(&player_id)?;
        let player = object.player.as_ref()?;

        let look = player.look_direction(object.transform.hpr.x, self.controller.config());
        let head = object.transform.pos + Vec3::Z * HEAD_HEIGHT;
        let grenade = WorldObject::grenade(
            Some(player_id),
            head + look * GRENADE_LAUNCH_DISTANCE,
            look * GRENADE_LAUNCH_SPEED + object.velocity,
        );
        Some(self.attach(grenade))
    }

    /// Flings every dynamic object in a random direction.
    pub fn explode(&mut self, rng: &mut impl Rng) {
        for object in self.objects.values() {
            if !object.kind.is_dynamic() {
                continue;
            }
            let Some(body) = object.body else {
                continue;
            };
            let velocity = Vec3::new(
                rng.gen_range(0.0..3.0),
                rng.gen_range(0.0..3.0),
                rng.gen_range(0.0..20.0),
            );
            self.physics.set_body_velocity(body, velocity);
        }
    }

    pub fn serialize(&self) -> Vec<ObjectRecord> {
        self.objects.values().map(WorldObject::record).collect()
    }

    /// Replaces the whole object table with `records`.
    pub fn deserialize(&mut self, records: &[ObjectRecord]) {
        let ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        for id in ids {
            self.remove(id);
        }
        for record in records {
            self.attach(WorldObject::from_record(record));
        }
    }

    pub fn get_state(&self) -> StateMap {
        let config = self.controller.config();
        self.objects
            .iter()
            .map(|(&id, object)| (id, object.state(config)))
            .collect()
    }

    /// Applies positional state. Ids that are not in the table are skipped.
    pub fn set_state(&mut self, states: &StateMap, fluid: bool) {
        let config = self.controller.config();
        for (id, state) in states {
            let Some(object) = self.objects.get_mut(id) else {
                continue;
            };
            object.apply_state(state, fluid, config);
            if fluid {
                continue;
            }
            if let Some(body) = object.body {
                self.physics
                    .set_body_pose(body, object.transform.pos, object.transform.rotation());
            }
        }
    }

    /// Advances fluid state updates by `dt`.
    pub fn animate(&mut self, dt: f32) {
        for object in self.objects.values_mut() {
            if !object.animate(dt) {
                continue;
            }
            if let Some(body) = object.body {
                self.physics
                    .set_body_pose(body, object.transform.pos, object.transform.rotation());
            }
        }
    }
}

/// Copies a dynamic body's pose back into its object. Returns whether it moved.
fn sync_dynamic(physics: &PhysicsWorld, object: &mut WorldObject) -> bool {
    let Some(body) = object.body else {
        return false;
    };
    let Some((pos, rotation)) = physics.body_pose(body) else {
        return false;
    };

    object.velocity = physics.body_velocity(body).unwrap_or_default();
    let hpr = quat_to_hpr(rotation);
    let moved = pos != object.transform.pos || hpr != object.transform.hpr;
    object.transform = Transform::new(pos, hpr);
    moved && !physics.is_sleeping(body)
}
