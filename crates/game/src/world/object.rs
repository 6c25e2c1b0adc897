use std::collections::BTreeMap;

use glam::{EulerRot, Quat, Vec3, Vec4};
use rapier3d::dynamics::RigidBodyHandle;
use serde::{Deserialize, Serialize};

use crate::codec::{Fields, Value};
use crate::net::{ProtocolError, read_field};
use crate::player::{PlayerConfig, PlayerState};

pub type ObjectId = u32;

/// Per-object positional state, keyed by world id.
pub type StateMap = BTreeMap<ObjectId, ObjectState>;

/// Duration over which fluid state updates are interpolated.
pub const FLUID_DURATION: f32 = 1.0 / 30.0;

pub const GRENADE_RADIUS: f32 = 0.25;
pub const GRENADE_MASS: f32 = 1.0;

/// Converts heading/pitch/roll in degrees (Z-up) to a rotation.
pub fn hpr_to_quat(hpr: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZXY,
        hpr.x.to_radians(),
        hpr.y.to_radians(),
        hpr.z.to_radians(),
    )
}

pub fn quat_to_hpr(rotation: Quat) -> Vec3 {
    let (h, p, r) = rotation.to_euler(EulerRot::ZXY);
    Vec3::new(h.to_degrees(), p.to_degrees(), r.to_degrees())
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub pos: Vec3,
    pub hpr: Vec3,
}

impl Transform {
    pub fn new(pos: Vec3, hpr: Vec3) -> Self {
        Self { pos, hpr }
    }

    pub fn rotation(&self) -> Quat {
        hpr_to_quat(self.hpr)
    }

    fn lerp(&self, to: &Transform, t: f32) -> Transform {
        let turn = (to.hpr - self.hpr).map(wrap_degrees);
        Transform {
            pos: self.pos.lerp(to.pos, t),
            hpr: self.hpr + turn * t,
        }
    }
}

fn wrap_degrees(angle: f32) -> f32 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

/// A spawn point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Incarnator {
    pub location: Vec3,
    #[serde(default)]
    pub heading: f32,
}

impl Incarnator {
    pub fn new(location: Vec3, heading: f32) -> Self {
        Self { location, heading }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Ground,
    Block {
        center: Vec3,
        size: Vec3,
        color: Vec4,
        mass: f32,
    },
    Ramp {
        base: Vec3,
        top: Vec3,
        width: f32,
        thickness: f32,
        color: Vec4,
        ypr: Vec3,
    },
    Player {
        pid: u32,
    },
    Grenade {
        mass: f32,
        owner: Option<ObjectId>,
    },
}

impl ObjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Ground => "ground",
            ObjectKind::Block { .. } => "block",
            ObjectKind::Ramp { .. } => "ramp",
            ObjectKind::Player { .. } => "player",
            ObjectKind::Grenade { .. } => "grenade",
        }
    }

    /// Whether the object is driven by the rigid-body simulation.
    pub fn is_dynamic(&self) -> bool {
        match self {
            ObjectKind::Block { mass, .. } => *mass > 0.0,
            ObjectKind::Grenade { .. } => true,
            _ => false,
        }
    }

    fn write_fields(&self, fields: &mut Fields) {
        let mut put = |name: &str, value: Value| {
            fields.insert(name.to_string(), value);
        };

        match self {
            ObjectKind::Ground => {}
            ObjectKind::Block {
                center,
                size,
                color,
                mass,
            } => {
                put("center", (*center).into());
                put("size", (*size).into());
                put("color", (*color).into());
                put("mass", (*mass).into());
            }
            ObjectKind::Ramp {
                base,
                top,
                width,
                thickness,
                color,
                ypr,
            } => {
                put("base", (*base).into());
                put("top", (*top).into());
                put("width", (*width).into());
                put("thickness", (*thickness).into());
                put("color", (*color).into());
                put("ypr", (*ypr).into());
            }
            ObjectKind::Player { pid } => put("pid", (*pid).into()),
            ObjectKind::Grenade { mass, owner } => {
                put("mass", (*mass).into());
                put("owner", owner.map(Value::from).unwrap_or_default());
            }
        }
    }

    fn read_fields(kind: &str, fields: &Fields) -> Result<Self, ProtocolError> {
        let kind = match kind {
            "ground" => ObjectKind::Ground,
            "block" => ObjectKind::Block {
                center: read_field(fields, "center", Value::as_vec3)?,
                size: read_field(fields, "size", Value::as_vec3)?,
                color: read_field(fields, "color", Value::as_vec4)?,
                mass: read_field(fields, "mass", Value::as_f32)?,
            },
            "ramp" => ObjectKind::Ramp {
                base: read_field(fields, "base", Value::as_vec3)?,
                top: read_field(fields, "top", Value::as_vec3)?,
                width: read_field(fields, "width", Value::as_f32)?,
                thickness: read_field(fields, "thickness", Value::as_f32)?,
                color: read_field(fields, "color", Value::as_vec4)?,
                ypr: read_field(fields, "ypr", Value::as_vec3)?,
            },
            "player" => ObjectKind::Player {
                pid: read_field(fields, "pid", Value::as_u32)?,
            },
            "grenade" => ObjectKind::Grenade {
                mass: read_field(fields, "mass", Value::as_f32)?,
                owner: match fields.get("owner") {
                    None | Some(Value::Nil) => None,
                    Some(value) => Some(value.as_u32().ok_or(ProtocolError::InvalidField("owner"))?),
                },
            },
            _ => return Err(ProtocolError::InvalidField("kind")),
        };
        Ok(kind)
    }
}

/// Identity plus constructor attributes: everything needed to rebuild an object
/// on another peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub world_id: Option<ObjectId>,
    pub name: String,
    pub kind: ObjectKind,
}

impl ObjectRecord {
    pub fn to_value(&self) -> Value {
        let mut fields = Fields::new();
        fields.insert("kind".to_string(), self.kind.name().into());
        fields.insert(
            "world_id".to_string(),
            self.world_id.map(Value::from).unwrap_or_default(),
        );
        fields.insert("name".to_string(), self.name.as_str().into());
        self.kind.write_fields(&mut fields);
        Value::Map(fields)
    }

    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let fields = value.as_map().ok_or(ProtocolError::InvalidField("objects"))?;
        let kind = read_field(fields, "kind", Value::as_str)?;
        let world_id = match fields.get("world_id") {
            None | Some(Value::Nil) => None,
            Some(value) => Some(value.as_u32().ok_or(ProtocolError::InvalidField("world_id"))?),
        };
        let name = fields
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            world_id,
            name,
            kind: ObjectKind::read_fields(kind, fields)?,
        })
    }
}

pub fn records_to_value(records: &[ObjectRecord]) -> Value {
    Value::Seq(records.iter().map(ObjectRecord::to_value).collect())
}

pub fn records_from_value(value: &Value) -> Result<Vec<ObjectRecord>, ProtocolError> {
    value
        .as_seq()
        .ok_or(ProtocolError::InvalidField("objects"))?
        .iter()
        .map(ObjectRecord::from_value)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectState {
    pub pos: Vec3,
    pub hpr: Vec3,
    pub head_hpr: Option<Vec3>,
}

impl ObjectState {
    pub fn to_value(&self) -> Value {
        let mut fields = Fields::new();
        fields.insert("pos".to_string(), self.pos.into());
        fields.insert("hpr".to_string(), self.hpr.into());
        if let Some(head_hpr) = self.head_hpr {
            fields.insert("head_hpr".to_string(), head_hpr.into());
        }
        Value::Map(fields)
    }

    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let fields = value.as_map().ok_or(ProtocolError::InvalidField("state"))?;
        Ok(Self {
            pos: read_field(fields, "pos", Value::as_vec3)?,
            hpr: read_field(fields, "hpr", Value::as_vec3)?,
            head_hpr: fields.get("head_hpr").and_then(Value::as_vec3),
        })
    }
}

pub fn states_to_value(states: &StateMap) -> Value {
    Value::Map(
        states
            .iter()
            .map(|(id, state)| (id.to_string(), state.to_value()))
            .collect(),
    )
}

pub fn states_from_value(value: &Value) -> Result<StateMap, ProtocolError> {
    let fields = value.as_map().ok_or(ProtocolError::InvalidField("state"))?;
    fields
        .iter()
        .map(|(id, state)| {
            let id = id
                .parse::<ObjectId>()
                .map_err(|_| ProtocolError::InvalidField("state"))?;
            Ok((id, ObjectState::from_value(state)?))
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Lerp {
    from: Transform,
    to: Transform,
    elapsed: f32,
}

#[derive(Debug, Clone)]
pub struct WorldObject {
    pub world_id: Option<ObjectId>,
    pub name: String,
    pub kind: ObjectKind,
    pub transform: Transform,
    pub velocity: Vec3,
    pub body: Option<RigidBodyHandle>,
    pub player: Option<PlayerState>,
    lerp: Option<Lerp>,
}

impl WorldObject {
    fn new(name: impl Into<String>, kind: ObjectKind, transform: Transform) -> Self {
        let player = matches!(kind, ObjectKind::Player { .. }).then(PlayerState::new);
        Self {
            world_id: None,
            name: name.into(),
            kind,
            transform,
            velocity: Vec3::ZERO,
            body: None,
            player,
            lerp: None,
        }
    }

    pub fn ground() -> Self {
        Self::new("ground", ObjectKind::Ground, Transform::default())
    }

    pub fn block(center: Vec3, size: Vec3, color: Vec4, mass: f32) -> Self {
        let kind = ObjectKind::Block {
            center,
            size,
            color,
            mass,
        };
        Self::new("block", kind, Transform::new(center, Vec3::ZERO))
    }

    pub fn ramp(base: Vec3, top: Vec3, width: f32, thickness: f32, color: Vec4, ypr: Vec3) -> Self {
        let kind = ObjectKind::Ramp {
            base,
            top,
            width,
            thickness,
            color,
            ypr,
        };
        let transform = Transform::new((base + top) * 0.5, quat_to_hpr(ramp_rotation(base, top, ypr)));
        Self::new("ramp", kind, transform)
    }

    pub fn player(pid: u32, name: impl Into<String>, spawn: Incarnator) -> Self {
        let transform = Transform::new(spawn.location, Vec3::new(spawn.heading, 0.0, 0.0));
        Self::new(name, ObjectKind::Player { pid }, transform)
    }

    pub fn grenade(owner: Option<ObjectId>, position: Vec3, velocity: Vec3) -> Self {
        let kind = ObjectKind::Grenade {
            mass: GRENADE_MASS,
            owner,
        };
        let mut grenade = Self::new("grenade", kind, Transform::new(position, Vec3::ZERO));
        grenade.velocity = velocity;
        grenade
    }

    /// Rebuilds an object from its constructor attributes, keeping its identity.
    pub fn from_record(record: &ObjectRecord) -> Self {
        let mut object = match record.kind {
            ObjectKind::Ground => Self::ground(),
            ObjectKind::Block {
                center,
                size,
                color,
                mass,
            } => Self::block(center, size, color, mass),
            ObjectKind::Ramp {
                base,
                top,
                width,
                thickness,
                color,
                ypr,
            } => Self::ramp(base, top, width, thickness, color, ypr),
            ObjectKind::Player { pid } => Self::player(pid, record.name.clone(), Incarnator::default()),
            ObjectKind::Grenade { owner, .. } => Self::grenade(owner, Vec3::ZERO, Vec3::ZERO),
        };
        object.kind = record.kind.clone();
        object.name = record.name.clone();
        object.world_id = record.world_id;
        object
    }

    pub fn record(&self) -> ObjectRecord {
        ObjectRecord {
            world_id: self.world_id,
            name: self.name.clone(),
            kind: self.kind.clone(),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match self.kind {
            ObjectKind::Player { pid } => Some(pid),
            _ => None,
        }
    }

    pub fn state(&self, config: &PlayerConfig) -> ObjectState {
        ObjectState {
            pos: self.transform.pos,
            hpr: self.transform.hpr,
            head_hpr: self.player.as_ref().map(|p| p.head_hpr(config)),
        }
    }

    pub fn apply_state(&mut self, state: &ObjectState, fluid: bool, config: &PlayerConfig) {
        let target = Transform::new(state.pos, state.hpr);
        if fluid {
            self.lerp = Some(Lerp {
                from: self.transform,
                to: target,
                elapsed: 0.0,
            });
        } else {
            self.lerp = None;
            self.transform = target;
        }

        if let (Some(player), Some(head_hpr)) = (self.player.as_mut(), state.head_hpr) {
            player.set_head_hpr(head_hpr, config);
        }
    }

    /// Advances any in-flight fluid update. Returns whether the transform moved.
    pub fn animate(&mut self, dt: f32) -> bool {
        let Some(lerp) = self.lerp.as_mut() else {
            return false;
        };

        lerp.elapsed += dt;
        let t = (lerp.elapsed / FLUID_DURATION).min(1.0);
        self.transform = lerp.from.lerp(&lerp.to, t);
        if t >= 1.0 {
            self.transform = lerp.to;
            self.lerp = None;
        }
        true
    }

    pub fn is_animating(&self) -> bool {
        self.lerp.is_some()
    }
}

/// Orientation of a ramp slab running from `base` to `top`, with `ypr` applied
/// about the slab's own axes.
pub fn ramp_rotation(base: Vec3, top: Vec3, ypr: Vec3) -> Quat {
    let along = (top - base).normalize_or(Vec3::Y);
    Quat::from_rotation_arc(Vec3::Y, along) * hpr_to_quat(ypr)
}
