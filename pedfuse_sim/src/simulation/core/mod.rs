// pedfuse_sim/src/simulation/core/mod.rs

pub mod events;
pub mod prng;
