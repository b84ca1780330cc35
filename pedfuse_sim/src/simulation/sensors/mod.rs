// pedfuse_sim/src/simulation/sensors/mod.rs

//! Synthetic sensor models. Each one reads the ground-truth track and emits
//! the noisy messages a phone would deliver.

pub mod fix;
pub mod pdr;
