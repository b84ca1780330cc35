// pedfuse_sim/src/simulation/sensors/fix.rs

use pedfuse_core::frames::ReferenceFrame;
use pedfuse_core::messages::{Observation, SensorSource};
use pedfuse_core::types::LocalPoint;

use crate::simulation::config::FixSensorConfig;
use crate::simulation::core::events::{truth_at, GroundTruth};
use crate::simulation::core::prng::SimulationRng;

/// Periodic absolute fixes (GNSS or WiFi): the true position plus Gaussian
/// noise on each axis, with random dropouts.
pub fn simulate_fixes(
    truth: &[GroundTruth],
    config: &FixSensorConfig,
    source: SensorSource,
    frame: &ReferenceFrame,
    rng: &mut SimulationRng,
) -> Vec<Observation> {
    let Some(last) = truth.last() else {
        return Vec::new();
    };
    if !config.enabled {
        return Vec::new();
    }
    let period = 1.0 / config.rate_hz;
    let mut fixes = Vec::new();
    let mut k = 1u64;
    loop {
        let t = k as f64 * period;
        if t > last.timestamp {
            break;
        }
        k += 1;
        if rng.chance(config.dropout_probability) {
            continue;
        }
        let Some(sample) = truth_at(truth, t) else {
            continue;
        };
        let noisy = sample.position
            + LocalPoint::new(rng.gaussian(config.noise_m), rng.gaussian(config.noise_m));
        let observation = Observation::new(frame.to_geodetic(&noisy), source, t);
        fixes.push(if config.report_accuracy {
            observation.with_accuracy(config.noise_m)
        } else {
            observation
        });
    }
    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pedfuse_core::types::GeoPoint;

    fn truth(seconds: usize) -> Vec<GroundTruth> {
        (0..=seconds * 2)
            .map(|i| GroundTruth {
                timestamp: i as f64 * 0.5,
                position: LocalPoint::new(0.0, i as f64 * 0.7),
                heading_deg: 0.0,
            })
            .collect()
    }

    fn frame() -> ReferenceFrame {
        ReferenceFrame::new(GeoPoint::new(55.9444, -3.1870)).unwrap()
    }

    #[test]
    fn fixes_follow_the_configured_rate() {
        let config = FixSensorConfig {
            dropout_probability: 0.0,
            ..Default::default()
        };
        let fixes = simulate_fixes(
            &truth(30),
            &config,
            SensorSource::Gnss,
            &frame(),
            &mut SimulationRng::new(Some(3)),
        );
        assert_eq!(fixes.len(), 30);
        assert!(fixes.iter().all(|f| f.validate().is_ok()));
        assert!(fixes.iter().all(|f| f.source == SensorSource::Gnss));
        assert!(fixes.iter().all(|f| f.covariance.is_some()));
    }

    #[test]
    fn full_dropout_or_disabled_emits_nothing() {
        let lost = FixSensorConfig {
            dropout_probability: 1.0,
            ..Default::default()
        };
        let disabled = FixSensorConfig {
            enabled: false,
            ..Default::default()
        };
        let mut rng = SimulationRng::new(Some(3));
        for config in [lost, disabled] {
            let fixes = simulate_fixes(&truth(30), &config, SensorSource::Wifi, &frame(), &mut rng);
            assert!(fixes.is_empty());
        }
    }

    #[test]
    fn noise_is_centred_on_truth() {
        let config = FixSensorConfig {
            rate_hz: 2.0,
            noise_m: 3.0,
            dropout_probability: 0.0,
            report_accuracy: false,
            ..Default::default()
        };
        let truth = truth(500);
        let frame = frame();
        let fixes = simulate_fixes(
            &truth,
            &config,
            SensorSource::Wifi,
            &frame,
            &mut SimulationRng::new(Some(4)),
        );
        let mean_error = fixes
            .iter()
            .map(|f| {
                let t = truth_at(&truth, f.timestamp).unwrap().position;
                frame.resolve_local(&f.position) - t
            })
            .fold(LocalPoint::zeros(), |acc, e| acc + e)
            / fixes.len() as f64;
        assert!(mean_error.norm() < 0.5);
        assert!(fixes.iter().all(|f| f.covariance.is_none()));
    }
}
