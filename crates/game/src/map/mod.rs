mod testing_ground;

pub use testing_ground::testing_ground;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::world::{Incarnator, ObjectId, World, WorldObject};

pub const DEFAULT_COLOR: Vec4 = Vec4::new(0.6, 0.6, 0.6, 1.0);

fn default_color() -> Vec4 {
    DEFAULT_COLOR
}

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("map is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("map object {index}: {reason}")]
    InvalidObject { index: usize, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapObject {
    Ground,
    Block {
        center: Vec3,
        size: Vec3,
        #[serde(default = "default_color")]
        color: Vec4,
        #[serde(default)]
        mass: f32,
    },
    Ramp {
        base: Vec3,
        top: Vec3,
        width: f32,
        thickness: f32,
        #[serde(default = "default_color")]
        color: Vec4,
        #[serde(default)]
        ypr: Vec3,
    },
}

impl MapObject {
    pub fn static_box(center: Vec3, size: Vec3) -> Self {
        MapObject::Block {
            center,
            size,
            color: DEFAULT_COLOR,
            mass: 0.0,
        }
    }

    pub fn dynamic_box(center: Vec3, size: Vec3, mass: f32) -> Self {
        MapObject::Block {
            center,
            size,
            color: DEFAULT_COLOR,
            mass,
        }
    }

    pub fn ramp(base: Vec3, top: Vec3, width: f32, thickness: f32) -> Self {
        MapObject::Ramp {
            base,
            top,
            width,
            thickness,
            color: DEFAULT_COLOR,
            ypr: Vec3::ZERO,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, MapObject::Block { mass, .. } if *mass > 0.0)
    }

    fn validate(&self) -> Result<(), &'static str> {
        match self {
            MapObject::Ground => Ok(()),
            MapObject::Block { size, mass, .. } => {
                if size.min_element() <= 0.0 {
                    Err("block size must be positive")
                } else if *mass < 0.0 {
                    Err("block mass must not be negative")
                } else {
                    Ok(())
                }
            }
            MapObject::Ramp {
                base,
                top,
                width,
                thickness,
                ..
            } => {
                if base.distance_squared(*top) <= f32::EPSILON {
                    Err("ramp base and top coincide")
                } else if *width <= 0.0 || *thickness <= 0.0 {
                    Err("ramp width and thickness must be positive")
                } else {
                    Ok(())
                }
            }
        }
    }

    pub fn build(&self) -> WorldObject {
        match *self {
            MapObject::Ground => WorldObject::ground(),
            MapObject::Block {
                center,
                size,
                color,
                mass,
            } => WorldObject::block(center, size, color, mass),
            MapObject::Ramp {
                base,
                top,
                width,
                thickness,
                color,
                ypr,
            } => WorldObject::ramp(base, top, width, thickness, color, ypr),
        }
    }
}

/// A loadable level: static geometry, props, and spawn points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub objects: Vec<MapObject>,
    #[serde(default)]
    pub incarnators: Vec<Incarnator>,
}

impl MapDefinition {
    pub fn from_json(json: &str) -> Result<Self, MapError> {
        let map: MapDefinition = serde_json::from_str(json)?;
        for (index, object) in map.objects.iter().enumerate() {
            object
                .validate()
                .map_err(|reason| MapError::InvalidObject { index, reason })?;
        }
        Ok(map)
    }

    pub fn to_json(&self) -> Result<String, MapError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Attaches every map object to `world` and registers the spawn points.
    pub fn spawn(&self, world: &mut World) -> Vec<ObjectId> {
        for incarnator in &self.incarnators {
            world.add_incarnator(*incarnator);
        }
        let ids: Vec<ObjectId> = self
            .objects
            .iter()
            .map(|object| world.attach(object.build()))
            .collect();

        log::info!(
            "Loaded map '{}': {} objects, {} incarnators",
            self.name,
            ids.len(),
            self.incarnators.len()
        );
        ids
    }
}
