use glam::Vec3;

use crate::world::hpr_to_quat;

use super::PlayerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAxis {
    Forward,
    Backward,
    Left,
    Right,
    Center,
}

impl InputAxis {
    pub fn name(self) -> &'static str {
        match self {
            InputAxis::Forward => "forward",
            InputAxis::Backward => "backward",
            InputAxis::Left => "left",
            InputAxis::Right => "right",
            InputAxis::Center => "center",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "forward" => Some(InputAxis::Forward),
            "backward" => Some(InputAxis::Backward),
            "left" => Some(InputAxis::Left),
            "right" => Some(InputAxis::Right),
            "center" => Some(InputAxis::Center),
            _ => None,
        }
    }
}

/// Which movement keys are currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionIntent {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

/// Collision-resolution anomalies seen by the controller. These never abort a
/// tick; the player is kept at the last clear position instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveDiagnostics {
    pub backoff_overlaps: u32,
    pub slide_blocked: u32,
    pub retries_exhausted: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub intent: MotionIntent,
    pub motor_power: f32,
    pub turn_power: f32,
    pub velocity: Vec3,
    pub resting: bool,
    pub head_swivel: f32,
    pub head_pitch: f32,
    pub look_dirty: bool,
    pub diagnostics: MoveDiagnostics,
}

impl PlayerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input(&mut self, axis: InputAxis, pressed: bool) {
        match axis {
            InputAxis::Forward => self.intent.forward = pressed,
            InputAxis::Backward => self.intent.backward = pressed,
            InputAxis::Left => self.intent.left = pressed,
            InputAxis::Right => self.intent.right = pressed,
            InputAxis::Center => {
                if pressed {
                    self.head_swivel = 0.0;
                    self.head_pitch = 0.0;
                    self.look_dirty = true;
                }
            }
        }
    }

    pub fn add_look(&mut self, dx: f32, dy: f32) {
        self.head_swivel = (self.head_swivel + dx).clamp(-1.0, 1.0);
        self.head_pitch = (self.head_pitch + dy).clamp(-1.0, 1.0);
        self.look_dirty = true;
    }

    pub fn head_hpr(&self, config: &PlayerConfig) -> Vec3 {
        Vec3::new(
            -self.head_swivel * config.max_head_swivel,
            self.head_pitch * config.max_head_pitch,
            0.0,
        )
    }

    /// Recovers swivel and pitch from a mirrored head orientation.
    pub fn set_head_hpr(&mut self, head_hpr: Vec3, config: &PlayerConfig) {
        self.head_swivel = (-head_hpr.x / config.max_head_swivel).clamp(-1.0, 1.0);
        self.head_pitch = (head_hpr.y / config.max_head_pitch).clamp(-1.0, 1.0);
    }

    /// Unit vector the head is looking along for a body facing `heading` degrees.
    pub fn look_direction(&self, heading: f32, config: &PlayerConfig) -> Vec3 {
        let head = self.head_hpr(config);
        let hpr = Vec3::new(heading + head.x, head.y, 0.0);
        hpr_to_quat(hpr) * Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_is_clamped_and_centered() {
        let config = PlayerConfig::default();
        let mut state = PlayerState::new();

        state.add_look(0.7, -0.2);
        state.add_look(0.7, -0.2);
        assert_eq!(state.head_swivel, 1.0);
        assert!((state.head_pitch + 0.4).abs() < 1e-6);
        assert_eq!(state.head_hpr(&config).x, -60.0);

        state.look_dirty = false;
        state.set_input(InputAxis::Center, true);
        assert_eq!(state.head_hpr(&config), Vec3::ZERO);
        assert!(state.look_dirty);
    }

    #[test]
    fn look_direction_follows_heading() {
        let config = PlayerConfig::default();
        let state = PlayerState::new();

        let ahead = state.look_direction(0.0, &config);
        assert!((ahead - Vec3::Y).length() < 1e-5);

        let left = state.look_direction(90.0, &config);
        assert!((left - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn axis_names_roundtrip() {
        for axis in [
            InputAxis::Forward,
            InputAxis::Backward,
            InputAxis::Left,
            InputAxis::Right,
            InputAxis::Center,
        ] {
            assert_eq!(InputAxis::from_name(axis.name()), Some(axis));
        }
        assert_eq!(InputAxis::from_name("jump"), None);
    }
}
