// pedfuse_core/src/session.rs

//! The per-session fusion pipeline: one reference frame, one estimator, and
//! the PDR bookkeeping that turns cumulative samples into control inputs.

use tracing::{debug, info};

use crate::config::FilterConfig;
use crate::error::FilterError;
use crate::estimation::{Estimator, FilterKind, PositionFilter};
use crate::frames::ReferenceFrame;
use crate::messages::{ControlInput, Estimate, Observation, PdrSample};
use crate::smoothing::low_pass;
use crate::types::{Covariance, GeoPoint, LocalPoint, Position};

/// Counts of inputs the session committed or refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub steps_accepted: usize,
    pub observations_accepted: usize,
    pub rejected: usize,
}

/// Owns everything one fusion session needs. Several sessions can run side
/// by side; nothing is shared between them.
#[derive(Debug, Clone)]
pub struct FusionSession {
    frame: ReferenceFrame,
    estimator: Estimator,
    output_alpha: Option<f64>,
    last_pdr: Option<PdrSample>,
    smoothed: Option<GeoPoint>,
    stats: SessionStats,
}

impl FusionSession {
    pub fn new(config: &FilterConfig, anchor: GeoPoint) -> Result<Self, FilterError> {
        let frame = ReferenceFrame::new(anchor)?;
        let estimator = Estimator::from_config(config, frame)?;
        info!(kind = %config.kind, ?anchor, "fusion session started");
        Ok(Self {
            frame,
            estimator,
            output_alpha: config.output_alpha,
            last_pdr: None,
            smoothed: None,
            stats: SessionStats::default(),
        })
    }

    pub fn kind(&self) -> FilterKind {
        self.estimator.kind()
    }

    pub fn frame(&self) -> &ReferenceFrame {
        &self.frame
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Feeds one cumulative PDR sample.
    ///
    /// The first sample only primes the tracker and returns `Ok(None)`.
    /// Later samples must have strictly increasing timestamps.
    pub fn push_pdr(&mut self, sample: PdrSample) -> Result<Option<Estimate>, FilterError> {
        let result = self.try_push_pdr(sample);
        if result.is_err() {
            self.stats.rejected += 1;
        }
        result
    }

    fn try_push_pdr(&mut self, sample: PdrSample) -> Result<Option<Estimate>, FilterError> {
        if !sample.timestamp.is_finite() || !sample.position.iter().all(|v| v.is_finite()) {
            return Err(FilterError::invalid("PDR sample is not finite"));
        }
        let Some(previous) = self.last_pdr else {
            self.last_pdr = Some(sample);
            return Ok(None);
        };
        if sample.timestamp <= previous.timestamp {
            return Err(FilterError::invalid(format!(
                "PDR timestamp {} does not follow {}",
                sample.timestamp, previous.timestamp
            )));
        }
        let control = ControlInput::between(&previous, &sample);
        let estimate = self.estimator.predict(&control)?;
        self.last_pdr = Some(sample);
        self.stats.steps_accepted += 1;
        self.record(&estimate);
        Ok(Some(estimate))
    }

    /// Corrects the estimate with one GNSS or WiFi fix. A rejected fix
    /// leaves the last estimate in place.
    pub fn push_observation(&mut self, observation: &Observation) -> Result<Estimate, FilterError> {
        match self.estimator.update(observation) {
            Ok(estimate) => {
                self.stats.observations_accepted += 1;
                self.record(&estimate);
                Ok(estimate)
            }
            Err(e) => {
                debug!(source = %observation.source, error = %e, "observation rejected");
                self.stats.rejected += 1;
                Err(e)
            }
        }
    }

    /// Restarts the estimator; PDR tracking continues from the last sample.
    pub fn reset(&mut self, position: Position, covariance: Covariance) -> Result<(), FilterError> {
        self.estimator.reset(position, covariance)?;
        self.smoothed = None;
        Ok(())
    }

    /// The best current estimate, low-passed when an output factor is set.
    pub fn fused_position(&self) -> GeoPoint {
        self.smoothed
            .unwrap_or_else(|| self.frame.resolve_geodetic(&self.estimator.position()))
    }

    pub fn local_position(&self) -> LocalPoint {
        self.frame.to_local(&self.fused_position())
    }

    pub fn covariance(&self) -> Covariance {
        self.estimator.covariance()
    }

    fn record(&mut self, estimate: &Estimate) {
        if let Some(alpha) = self.output_alpha {
            let current = self.frame.resolve_geodetic(&estimate.position);
            self.smoothed = low_pass(self.smoothed, Some(current), alpha);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SensorSource;
    use approx::assert_abs_diff_eq;

    const ANCHOR: GeoPoint = GeoPoint::new(55.9444, -3.1870);

    fn session(kind: FilterKind) -> FusionSession {
        let mut config = FilterConfig {
            kind,
            ..Default::default()
        };
        config.particle.count = 300;
        config.particle.seed = Some(11);
        config.particle.motion_noise = 0.0;
        FusionSession::new(&config, ANCHOR).unwrap()
    }

    #[test]
    fn first_sample_primes_the_tracker() {
        let mut s = session(FilterKind::Extended);
        assert_eq!(s.push_pdr(PdrSample::new(3.0, 4.0, 0.0)).unwrap(), None);
        assert_eq!(s.stats().steps_accepted, 0);
        let local = s.local_position();
        assert_abs_diff_eq!(local.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn pdr_steps_move_every_variant() {
        for kind in [FilterKind::Kalman, FilterKind::Extended, FilterKind::Particle] {
            let mut s = session(kind);
            s.push_pdr(PdrSample::new(0.0, 0.0, 0.0)).unwrap();
            for i in 1..=10 {
                s.push_pdr(PdrSample::new(0.0, 0.7 * i as f64, 0.5 * i as f64))
                    .unwrap();
            }
            let local = s.local_position();
            assert!((local.y - 7.0).abs() < 1.0, "{kind}: {local:?}");
            assert_eq!(s.stats().steps_accepted, 10);
        }
    }

    #[test]
    fn non_increasing_timestamps_are_rejected() {
        let mut s = session(FilterKind::Kalman);
        s.push_pdr(PdrSample::new(0.0, 0.0, 1.0)).unwrap();
        s.push_pdr(PdrSample::new(0.0, 1.0, 2.0)).unwrap();
        let before = s.fused_position();

        let result = s.push_pdr(PdrSample::new(0.0, 2.0, 2.0));
        assert!(matches!(result, Err(FilterError::InvalidInput(_))));
        assert!(s.push_pdr(PdrSample::new(0.0, 2.0, 1.5)).is_err());
        assert_eq!(s.fused_position(), before);
        assert_eq!(s.stats().rejected, 2);

        // The next good sample still measures from the last accepted one.
        s.push_pdr(PdrSample::new(0.0, 3.0, 3.0)).unwrap();
        assert_abs_diff_eq!(s.local_position().y, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn rejected_observation_keeps_last_estimate() {
        let mut s = session(FilterKind::Extended);
        s.push_pdr(PdrSample::new(0.0, 0.0, 0.0)).unwrap();
        s.push_pdr(PdrSample::new(1.0, 0.0, 0.5)).unwrap();
        let before = s.fused_position();
        let null = Observation::new(GeoPoint::new(0.0, 0.0), SensorSource::Wifi, 0.6);
        assert!(s.push_observation(&null).is_err());
        assert_eq!(s.fused_position(), before);
        assert_eq!(s.stats().rejected, 1);
    }

    #[test]
    fn observations_pull_the_estimate() {
        let mut s = session(FilterKind::Kalman);
        let frame = *s.frame();
        let fix = frame.to_geodetic(&LocalPoint::new(0.0, 20.0));
        s.push_observation(&Observation::new(fix, SensorSource::Gnss, 1.0).with_accuracy(1.0))
            .unwrap();
        assert!(s.local_position().y > 10.0);
        assert_eq!(s.stats().observations_accepted, 1);
    }

    #[test]
    fn output_low_pass_lags_behind_the_filter() {
        let config = FilterConfig {
            kind: FilterKind::Kalman,
            output_alpha: Some(0.5),
            ..Default::default()
        };
        let mut s = FusionSession::new(&config, ANCHOR).unwrap();
        s.push_pdr(PdrSample::new(0.0, 0.0, 0.0)).unwrap();
        s.push_pdr(PdrSample::new(0.0, 4.0, 1.0)).unwrap();
        s.push_pdr(PdrSample::new(0.0, 8.0, 2.0)).unwrap();

        let raw = s.frame().resolve_local(&s.estimator().position());
        let smoothed = s.local_position();
        assert_abs_diff_eq!(raw.y, 8.0, epsilon = 1e-9);
        // 4·0.5 + 8·0.5
        assert_abs_diff_eq!(smoothed.y, 6.0, epsilon = 1e-6);
    }
}
