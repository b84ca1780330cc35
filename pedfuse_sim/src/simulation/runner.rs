// pedfuse_sim/src/simulation/runner.rs

//! Feeds a generated scenario through a fusion session and scores the
//! result against ground truth.

use std::fmt;

use anyhow::Result;
use pedfuse_core::config::{FilterConfig, FilterKind};
use pedfuse_core::session::{FusionSession, SessionStats};
use pedfuse_core::smoothing::TrajectorySmoother;
use pedfuse_core::types::LocalPoint;
use tracing::{debug, info, warn};

use crate::simulation::core::events::{truth_at, SensorEvent};
use crate::simulation::walker::Scenario;

/// Root-mean-square of a stream of errors.
#[derive(Debug, Clone, Copy, Default)]
struct ErrorAccumulator {
    sum_sq: f64,
    count: usize,
}

impl ErrorAccumulator {
    fn push(&mut self, error: f64) {
        self.sum_sq += error * error;
        self.count += 1;
    }

    fn rmse(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_sq / self.count as f64).sqrt()
        }
    }
}

/// Error metrics of one filter over one scenario, all in metres.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub kind: FilterKind,
    pub scored_steps: usize,
    pub stats: SessionStats,
    pub rmse_pdr_m: f64,
    pub rmse_fused_m: f64,
    pub rmse_smoothed_m: f64,
    pub final_error_m: f64,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} filter ---", self.kind)?;
        writeln!(
            f,
            "  steps scored: {:>6}   fixes accepted: {:>5}   rejected: {:>4}",
            self.scored_steps, self.stats.observations_accepted, self.stats.rejected
        )?;
        writeln!(f, "  RMSE raw PDR:  {:>9.2} m", self.rmse_pdr_m)?;
        writeln!(f, "  RMSE fused:    {:>9.2} m", self.rmse_fused_m)?;
        writeln!(f, "  RMSE smoothed: {:>9.2} m", self.rmse_smoothed_m)?;
        write!(f, "  final error:   {:>9.2} m", self.final_error_m)
    }
}

/// Runs one filter over the scenario's event stream.
pub fn run(scenario: &Scenario, filter: &FilterConfig, smoothing_window: usize) -> Result<RunReport> {
    let mut session = FusionSession::new(filter, scenario.frame.anchor())?;
    let mut smoother = TrajectorySmoother::<LocalPoint>::new(smoothing_window)?;

    let mut pdr_error = ErrorAccumulator::default();
    let mut fused_error = ErrorAccumulator::default();
    let mut smoothed_error = ErrorAccumulator::default();
    let mut final_error_m = 0.0;

    for event in &scenario.events {
        match event {
            SensorEvent::Pdr(sample) => match session.push_pdr(*sample) {
                Ok(Some(_)) => {
                    let Some(truth) = truth_at(&scenario.truth, sample.timestamp) else {
                        continue;
                    };
                    let fused = session.local_position();
                    let smoothed = smoother.push(fused);
                    pdr_error.push((sample.position - truth.position).norm());
                    final_error_m = (fused - truth.position).norm();
                    fused_error.push(final_error_m);
                    smoothed_error.push((smoothed - truth.position).norm());
                }
                Ok(None) => debug!("PDR tracker primed"),
                Err(e) => warn!(error = %e, "PDR sample rejected"),
            },
            SensorEvent::Fix(observation) => {
                // Rejections are counted by the session and logged there.
                let _ = session.push_observation(observation);
            }
        }
    }

    let report = RunReport {
        kind: session.kind(),
        scored_steps: fused_error.count,
        stats: session.stats(),
        rmse_pdr_m: pdr_error.rmse(),
        rmse_fused_m: fused_error.rmse(),
        rmse_smoothed_m: smoothed_error.rmse(),
        final_error_m,
    };
    info!(
        kind = %report.kind,
        rmse_fused = report.rmse_fused_m,
        rmse_pdr = report.rmse_pdr_m,
        "run finished"
    );
    Ok(report)
}

/// Runs several filter variants over the same event stream.
pub fn compare(
    scenario: &Scenario,
    base: &FilterConfig,
    kinds: &[FilterKind],
    smoothing_window: usize,
) -> Result<Vec<RunReport>> {
    kinds
        .iter()
        .map(|&kind| {
            let config = FilterConfig {
                kind,
                ..base.clone()
            };
            run(scenario, &config, smoothing_window)
        })
        .collect()
}
