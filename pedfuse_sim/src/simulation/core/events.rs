// pedfuse_sim/src/simulation/core/events.rs

use pedfuse_core::messages::{Observation, PdrSample};
use pedfuse_core::types::LocalPoint;

/// One message on the simulated sensor bus, in the order the fusion session
/// receives them.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Pdr(PdrSample),
    Fix(Observation),
}

impl SensorEvent {
    pub fn timestamp(&self) -> f64 {
        match self {
            SensorEvent::Pdr(sample) => sample.timestamp,
            SensorEvent::Fix(observation) => observation.timestamp,
        }
    }
}

/// Where the pedestrian really was, in the scenario's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundTruth {
    pub timestamp: f64,
    pub position: LocalPoint,
    /// Degrees clockwise from north.
    pub heading_deg: f64,
}

/// The truth at `timestamp`: the last sample at or before it.
pub fn truth_at(truth: &[GroundTruth], timestamp: f64) -> Option<&GroundTruth> {
    let index = truth.partition_point(|s| s.timestamp <= timestamp);
    index.checked_sub(1).and_then(|i| truth.get(i))
}
