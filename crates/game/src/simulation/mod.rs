mod tick;

pub use tick::{LoopState, SimulationLoop};
