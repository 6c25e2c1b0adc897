use std::time::Duration;

use crate::net::ServerEvent;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

/// Fixed-rate authoritative tick. Starts idle; once started it keeps running
/// for the life of the process.
#[derive(Debug)]
pub struct SimulationLoop {
    tick_rate: u32,
    dt: f32,
    state: LoopState,
}

impl SimulationLoop {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            state: LoopState::Idle,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate))
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Returns `true` only on the transition out of idle.
    pub fn start(&mut self) -> bool {
        match self.state {
            LoopState::Idle => {
                self.state = LoopState::Running;
                true
            }
            LoopState::Running => false,
        }
    }

    /// Runs one tick of `world` if the loop is running and returns the events
    /// it produced.
    pub fn step(&mut self, world: &mut World) -> Vec<ServerEvent> {
        if !self.is_running() {
            return Vec::new();
        }
        world.tick(self.dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldObject;

    #[test]
    fn start_is_idempotent() {
        let mut sim = SimulationLoop::new(30);
        assert_eq!(sim.state(), LoopState::Idle);
        assert!(sim.start());
        assert!(!sim.start());
        assert!(sim.is_running());
    }

    #[test]
    fn idle_loop_does_not_tick() {
        let mut sim = SimulationLoop::new(30);
        let mut world = World::default();
        assert!(sim.step(&mut world).is_empty());
        assert_eq!(world.frame(), 0);
    }

    #[test]
    fn running_loop_counts_frames() {
        let mut sim = SimulationLoop::new(30);
        let mut world = World::default();
        world.attach(WorldObject::ground());
        sim.start();

        for _ in 0..5 {
            assert!(sim.step(&mut world).is_empty());
        }
        assert_eq!(world.frame(), 5);
        assert_eq!(sim.tick_duration(), Duration::from_secs_f64(1.0 / 30.0));
    }
}
