// pedfuse_sim/src/simulation/sensors/pdr.rs

use pedfuse_core::messages::PdrSample;
use pedfuse_core::types::LocalPoint;

use crate::simulation::config::PdrSensorConfig;
use crate::simulation::core::events::GroundTruth;
use crate::simulation::core::prng::SimulationRng;

/// Dead reckoning over the true steps, corrupted by a step-length scale
/// error and a slowly drifting heading bias.
///
/// Emits one cumulative sample per truth sample, starting at the PDR origin
/// (0, 0) which coincides with the start of the walk.
pub fn simulate_pdr(
    truth: &[GroundTruth],
    config: &PdrSensorConfig,
    rng: &mut SimulationRng,
) -> Vec<PdrSample> {
    let Some(first) = truth.first() else {
        return Vec::new();
    };
    let scale = 1.0 + config.step_length_scale_error;
    let mut bias_deg = config.initial_heading_bias_deg;
    let mut position = LocalPoint::zeros();

    let mut samples = Vec::with_capacity(truth.len());
    samples.push(PdrSample {
        position,
        timestamp: first.timestamp,
    });
    for pair in truth.windows(2) {
        let step = pair[1].position - pair[0].position;
        // Heading clockwise from north: east = sin, north = cos.
        let heading = step.x.atan2(step.y) + bias_deg.to_radians();
        let length = step.norm() * scale;
        position += LocalPoint::new(length * heading.sin(), length * heading.cos());
        samples.push(PdrSample {
            position,
            timestamp: pair[1].timestamp,
        });
        bias_deg += rng.gaussian(config.heading_bias_drift_deg);
    }
    samples
}
