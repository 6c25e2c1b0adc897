use glam::Vec3;

use crate::world::Incarnator;

use super::{MapDefinition, MapObject};

const PLATFORM_ROW_Y: f32 = 15.0;

/// Built-in map used when `load` carries no definition.
pub fn testing_ground() -> MapDefinition {
    let mut objects = vec![MapObject::Ground];

    add_platform_obstacles(&mut objects);
    add_stair_platforms(&mut objects);
    add_ramps(&mut objects);
    add_dynamic_props(&mut objects);

    MapDefinition {
        name: "testing ground".to_string(),
        objects,
        incarnators: vec![
            Incarnator::new(Vec3::new(0.0, 0.0, 0.0), 0.0),
            Incarnator::new(Vec3::new(-20.0, -20.0, 0.0), 45.0),
            Incarnator::new(Vec3::new(20.0, -20.0, 0.0), -45.0),
            Incarnator::new(Vec3::new(0.0, -30.0, 0.0), 180.0),
        ],
    }
}

fn add_platform_obstacles(objects: &mut Vec<MapObject>) {
    for (x, height) in [(5.0, 0.5), (8.0, 1.0), (11.0, 2.0), (14.0, 3.0), (18.0, 4.0)] {
        objects.push(MapObject::static_box(
            Vec3::new(x, PLATFORM_ROW_Y, height * 0.5),
            Vec3::new(2.0, 2.0, height),
        ));
    }
}

fn add_stair_platforms(objects: &mut Vec<MapObject>) {
    let stair_start = Vec3::new(-10.0, 5.0, 0.0);
    let step_height = 0.3;
    let step_depth = 0.8;
    let step_width = 4.0;

    for i in 0..10 {
        let z = step_height * (i as f32 + 0.5);
        let y = stair_start.y + step_depth * i as f32;
        objects.push(MapObject::static_box(
            Vec3::new(stair_start.x, y, z),
            Vec3::new(step_width, step_depth, step_height),
        ));
    }
}

fn add_ramps(objects: &mut Vec<MapObject>) {
    objects.push(MapObject::ramp(
        Vec3::new(25.0, -5.0, 0.0),
        Vec3::new(25.0, 10.0, 5.0),
        6.0,
        0.5,
    ));
}

fn add_dynamic_props(objects: &mut Vec<MapObject>) {
    objects.push(MapObject::dynamic_box(Vec3::new(3.0, 6.0, 0.6), Vec3::splat(1.2), 5.0));
    objects.push(MapObject::dynamic_box(Vec3::new(4.5, 6.0, 0.4), Vec3::splat(0.8), 2.0));
    objects.push(MapObject::dynamic_box(Vec3::new(6.0, 6.0, 0.8), Vec3::splat(1.6), 10.0));

    for i in 0..5 {
        objects.push(MapObject::dynamic_box(
            Vec3::new(-6.0 + i as f32 * 1.5, -8.0, 0.5 + i as f32 * 1.0),
            Vec3::splat(1.0),
            3.0,
        ));
    }

    objects.push(MapObject::dynamic_box(Vec3::new(0.0, -14.0, 1.0), Vec3::splat(2.0), 20.0));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testing_ground_has_spawns_and_props() {
        let map = testing_ground();
        assert!(matches!(map.objects[0], MapObject::Ground));
        assert!(map.objects.iter().any(MapObject::is_dynamic));
        assert!(!map.incarnators.is_empty());
    }
}
