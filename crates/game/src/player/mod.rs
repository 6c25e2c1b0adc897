mod config;
mod controller;
mod state;

pub use config::PlayerConfig;
pub use controller::PlayerController;
pub use state::{InputAxis, MotionIntent, MoveDiagnostics, PlayerState};
