// pedfuse_core/src/messages.rs

use crate::error::FilterError;
use crate::types::{is_valid_covariance, isotropic, Covariance, LocalPoint, Position};
use serde::{Deserialize, Serialize};
use std::fmt;

// =========================================================================
// == Sensor Sources ==
// =========================================================================

/// Which collaborator produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    Gnss,
    Wifi,
    /// A position derived from dead reckoning, used as a pseudo-observation.
    Pdr,
}

impl fmt::Display for SensorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorSource::Gnss => "GNSS",
            SensorSource::Wifi => "WIFI",
            SensorSource::Pdr => "PDR",
        };
        f.write_str(name)
    }
}

// =========================================================================
// == Observations ==
// =========================================================================

/// A single position fix from GNSS, WiFi or PDR.
///
/// An observation is consumed by exactly one `update` call; filters never
/// keep a history of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub position: Position,
    /// Observation covariance in metres². `None` means "use the filter's
    /// configured noise for this source".
    pub covariance: Option<Covariance>,
    /// The scalar σ behind `covariance`, when it came from `with_accuracy`.
    pub accuracy_m: Option<f64>,
    pub source: SensorSource,
    pub timestamp: f64,
}

impl Observation {
    pub fn new(position: impl Into<Position>, source: SensorSource, timestamp: f64) -> Self {
        Self {
            position: position.into(),
            covariance: None,
            accuracy_m: None,
            source,
            timestamp,
        }
    }

    /// Attaches an explicit covariance.
    pub fn with_covariance(mut self, covariance: Covariance) -> Self {
        self.covariance = Some(covariance);
        self.accuracy_m = None;
        self
    }

    /// Attaches an isotropic covariance from a scalar accuracy in metres,
    /// the form most location providers report.
    pub fn with_accuracy(mut self, sigma_m: f64) -> Self {
        self.covariance = Some(isotropic(sigma_m));
        self.accuracy_m = Some(sigma_m);
        self
    }

    /// Rejects NaN, out-of-range and (0, 0) fixes as well as malformed
    /// covariances or non-positive accuracies.
    pub fn validate(&self) -> Result<(), FilterError> {
        if !self.position.is_valid() {
            return Err(FilterError::invalid(format!(
                "{} observation has an invalid position {:?}",
                self.source, self.position
            )));
        }
        if !self.timestamp.is_finite() {
            return Err(FilterError::invalid("observation timestamp is not finite"));
        }
        if let Some(sigma) = self.accuracy_m {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(FilterError::invalid(format!(
                    "{} observation accuracy must be positive, got {sigma}",
                    self.source
                )));
            }
        }
        if let Some(cov) = &self.covariance {
            if !is_valid_covariance(cov) || cov.trace() <= 0.0 {
                return Err(FilterError::invalid(format!(
                    "{} observation covariance is not positive: {:?}",
                    self.source, cov
                )));
            }
        }
        Ok(())
    }
}

// =========================================================================
// == Dead-Reckoning Input ==
// =========================================================================

/// A cumulative PDR position, as emitted by the step detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdrSample {
    /// Accumulated east/north displacement since the PDR origin, in metres.
    pub position: LocalPoint,
    pub timestamp: f64,
}

impl PdrSample {
    pub fn new(east: f64, north: f64, timestamp: f64) -> Self {
        Self {
            position: LocalPoint::new(east, north),
            timestamp,
        }
    }
}

/// The motion input for one predict step: the displacement between two
/// consecutive PDR samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlInput {
    /// East/north displacement in metres.
    pub displacement: LocalPoint,
    /// Time elapsed since the previous sample, in seconds.
    pub dt: f64,
    /// Timestamp of the newer sample.
    pub timestamp: f64,
}

impl ControlInput {
    pub fn new(dx: f64, dy: f64, dt: f64, timestamp: f64) -> Self {
        Self {
            displacement: LocalPoint::new(dx, dy),
            dt,
            timestamp,
        }
    }

    /// Builds the control input between two consecutive PDR samples.
    pub fn between(previous: &PdrSample, next: &PdrSample) -> Self {
        Self {
            displacement: next.position - previous.position,
            dt: next.timestamp - previous.timestamp,
            timestamp: next.timestamp,
        }
    }

    /// Average velocity over the interval. `dt` must already be positive.
    pub fn velocity(&self, dt: f64) -> LocalPoint {
        self.displacement / dt
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        if !self.displacement.x.is_finite() || !self.displacement.y.is_finite() {
            return Err(FilterError::invalid("control displacement is not finite"));
        }
        if !self.dt.is_finite() || !self.timestamp.is_finite() {
            return Err(FilterError::invalid("control timing is not finite"));
        }
        Ok(())
    }
}

// =========================================================================
// == Filter Outputs & Inputs ==
// =========================================================================

/// The committed result of a successful predict or update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub position: Position,
    pub covariance: Covariance,
    pub timestamp: f64,
}

/// The universal input packet for `PositionFilter::process`.
#[derive(Debug, Clone, Copy)]
pub enum FusionInput<'a> {
    Control(&'a ControlInput),
    Observation(&'a Observation),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;

    #[test]
    fn control_between_samples() {
        let a = PdrSample::new(1.0, 2.0, 10.0);
        let b = PdrSample::new(1.5, 4.0, 10.5);
        let u = ControlInput::between(&a, &b);
        assert_eq!(u.displacement, LocalPoint::new(0.5, 2.0));
        assert_eq!(u.dt, 0.5);
        assert_eq!(u.timestamp, 10.5);
        assert_eq!(u.velocity(u.dt), LocalPoint::new(1.0, 4.0));
    }

    #[test]
    fn accuracy_becomes_isotropic_covariance() {
        let obs = Observation::new(GeoPoint::new(55.9, -3.2), SensorSource::Wifi, 1.0)
            .with_accuracy(3.0);
        assert_eq!(obs.covariance, Some(Covariance::identity() * 9.0));
        assert!(obs.validate().is_ok());
    }

    #[test]
    fn invalid_observations_are_rejected() {
        let null_fix = Observation::new(GeoPoint::new(0.0, 0.0), SensorSource::Gnss, 1.0);
        assert!(matches!(
            null_fix.validate(),
            Err(FilterError::InvalidInput(_))
        ));

        let zero_noise =
            Observation::new(GeoPoint::new(55.9, -3.2), SensorSource::Gnss, 1.0).with_accuracy(0.0);
        assert!(zero_noise.validate().is_err());

        let negative_noise = Observation::new(GeoPoint::new(55.9, -3.2), SensorSource::Gnss, 1.0)
            .with_accuracy(-3.0);
        assert!(matches!(
            negative_noise.validate(),
            Err(FilterError::InvalidInput(_))
        ));
        let nan_noise = Observation::new(GeoPoint::new(55.9, -3.2), SensorSource::Wifi, 1.0)
            .with_accuracy(f64::NAN);
        assert!(nan_noise.validate().is_err());

        let nan = Observation::new(LocalPoint::new(f64::NAN, 1.0), SensorSource::Pdr, 1.0);
        assert!(nan.validate().is_err());
    }
}
