use glam::Vec3;

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub turn_accel_time: f32,
    pub turn_speed: f32,
    pub turn_damper: f32,
    pub turn_damping: f32,

    pub walk_accel_time: f32,
    pub walk_speed: f32,
    pub motor_damping: f32,

    pub power_epsilon: f32,

    pub max_head_swivel: f32,
    pub max_head_pitch: f32,

    pub half_extents: Vec3,

    pub ground_ray_up: f32,
    pub ground_ray_down: f32,
    pub foot_offset: f32,

    pub backoff: f32,
    pub max_slide_attempts: u32,
    pub no_room_fraction: f32,

    pub settle_speed: f32,
    pub resting_threshold: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            turn_accel_time: 0.1,
            turn_speed: 75.0,
            turn_damper: 0.5,
            turn_damping: 1.25,

            walk_accel_time: 0.25,
            walk_speed: 12.0,
            motor_damping: 1.5,

            power_epsilon: 0.05,

            max_head_swivel: 60.0,
            max_head_pitch: 20.0,

            half_extents: Vec3::new(1.0, 1.0, 1.5),

            ground_ray_up: 1.5,
            ground_ray_down: 2.0,
            foot_offset: 1.52,

            backoff: 0.01,
            max_slide_attempts: 3,
            no_room_fraction: 1e-4,

            settle_speed: 1e-3,
            resting_threshold: 0.01,
        }
    }
}
