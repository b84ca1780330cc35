// pedfuse_sim/src/prelude.rs

// Re-export the entire pedfuse_core prelude so binaries can reach the pure
// types like `FusionSession`, `Observation`, `FilterConfig`, etc.
pub use pedfuse_core::prelude::*;

// Re-export common simulation-specific types.
pub use crate::cli::{Cli, FilterChoice};
pub use crate::simulation::config::{load_scenario, ScenarioConfig};
pub use crate::simulation::core::events::{GroundTruth, SensorEvent};
pub use crate::simulation::core::prng::SimulationRng;
pub use crate::simulation::runner::{compare, run, RunReport};
pub use crate::simulation::walker::{generate, Scenario};
