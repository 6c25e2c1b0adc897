use std::time::Duration;

use crate::net::DEFAULT_TICK_RATE;
use crate::world::WorldConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    /// Seeds spawn-point selection and `explode`. Random when unset.
    pub seed: Option<u64>,
    pub world: WorldConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            seed: None,
            world: WorldConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}
