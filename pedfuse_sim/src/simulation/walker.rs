// pedfuse_sim/src/simulation/walker.rs

//! Ground-truth walk generation and assembly of the sensor event stream.

use anyhow::Result;
use pedfuse_core::frames::ReferenceFrame;
use pedfuse_core::messages::SensorSource;
use pedfuse_core::types::LocalPoint;
use tracing::info;

use crate::simulation::config::{ScenarioConfig, Walk};
use crate::simulation::core::events::{GroundTruth, SensorEvent};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::sensors::{fix::simulate_fixes, pdr::simulate_pdr};

/// Everything one run needs: the frame, the truth to score against and the
/// time-ordered messages to feed the fusion session.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub frame: ReferenceFrame,
    pub truth: Vec<GroundTruth>,
    pub events: Vec<SensorEvent>,
}

impl Scenario {
    pub fn count(&self, source: SensorSource) -> usize {
        self.events
            .iter()
            .filter(|e| match e {
                SensorEvent::Pdr(_) => source == SensorSource::Pdr,
                SensorEvent::Fix(o) => o.source == source,
            })
            .count()
    }
}

/// Builds the truth track and all sensor streams from one seeded RNG.
pub fn generate(config: &ScenarioConfig) -> Result<Scenario> {
    let frame = ReferenceFrame::new(config.walk.anchor)?;
    let mut rng = SimulationRng::new(config.simulation.seed);

    // --- 1. Ground Truth ---
    let truth = walk_truth(&config.walk, config.simulation.duration_seconds, &mut rng);

    // --- 2. Sensors ---
    let pdr = simulate_pdr(&truth, &config.sensors.pdr, &mut rng);
    let gnss = simulate_fixes(
        &truth,
        &config.sensors.gnss,
        SensorSource::Gnss,
        &frame,
        &mut rng,
    );
    let wifi = simulate_fixes(
        &truth,
        &config.sensors.wifi,
        SensorSource::Wifi,
        &frame,
        &mut rng,
    );
    info!(
        steps = truth.len().saturating_sub(1),
        gnss = gnss.len(),
        wifi = wifi.len(),
        "scenario generated"
    );

    // --- 3. Merge into one stream ---
    // The sort is stable, so a PDR sample sharing a timestamp with a fix is
    // delivered first.
    let mut events: Vec<SensorEvent> = pdr.into_iter().map(SensorEvent::Pdr).collect();
    events.extend(gnss.into_iter().map(SensorEvent::Fix));
    events.extend(wifi.into_iter().map(SensorEvent::Fix));
    events.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));

    Ok(Scenario {
        frame,
        truth,
        events,
    })
}

/// A pedestrian starting at the anchor, taking one step every
/// `1 / cadence_hz` seconds with a randomly wandering heading.
pub fn walk_truth(walk: &Walk, duration: f64, rng: &mut SimulationRng) -> Vec<GroundTruth> {
    let period = 1.0 / walk.cadence_hz;
    let steps = (duration / period).floor() as usize;
    let mut heading_deg = walk.initial_heading_deg;
    let mut position = LocalPoint::zeros();

    let mut truth = Vec::with_capacity(steps + 1);
    truth.push(GroundTruth {
        timestamp: 0.0,
        position,
        heading_deg,
    });
    for k in 1..=steps {
        heading_deg += rng.gaussian(walk.heading_wander_deg);
        let h = heading_deg.to_radians();
        position += LocalPoint::new(h.sin(), h.cos()) * walk.step_length_m;
        truth.push(GroundTruth {
            timestamp: k as f64 * period,
            position,
            heading_deg,
        });
    }
    truth
}
