// pedfuse_sim/src/lib.rs

// This prelude is for convenience for other files WITHIN the pedfuse_sim crate.
pub mod prelude;

// This module contains all the simulation-specific logic.
pub mod cli;
pub mod simulation;

/// Default log filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,pedfuse_core=info,pedfuse_sim=info";
