// pedfuse_core/src/config.rs

//! Construction-time configuration for every estimator variant.
//!
//! All structs deserialize from a partial table: any missing field takes its
//! default, unknown fields are rejected.

use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::messages::SensorSource;
use crate::types::{is_valid_covariance, isotropic, Covariance};

pub use crate::estimation::FilterKind;

// =========================================================================
// == Top-Level Filter Configuration ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Which estimator variant runs the session.
    pub kind: FilterKind,
    /// Standard deviation of the initial isotropic covariance, metres.
    pub initial_sigma_m: f64,
    /// Blending factor of the optional output low-pass, in [0, 1].
    pub output_alpha: Option<f64>,
    pub kalman: KalmanConfig,
    pub ekf: EkfConfig,
    pub particle: ParticleConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::default(),
            initial_sigma_m: 10.0_f64.sqrt(),
            output_alpha: None,
            kalman: KalmanConfig::default(),
            ekf: EkfConfig::default(),
            particle: ParticleConfig::default(),
        }
    }
}

impl FilterConfig {
    pub fn initial_covariance(&self) -> Covariance {
        isotropic(self.initial_sigma_m)
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        require_positive("initial_sigma_m", self.initial_sigma_m)?;
        if let Some(alpha) = self.output_alpha {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(FilterError::config(format!(
                    "output_alpha must be within [0, 1], got {alpha}"
                )));
            }
        }
        self.kalman.validate()?;
        self.ekf.validate()?;
        self.particle.validate()
    }
}

// =========================================================================
// == Per-Variant Configuration ==
// =========================================================================

/// Linear Kalman filter, local metric frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KalmanConfig {
    /// PDR step covariance for a walk due north, row-major, metres². It is
    /// rotated with the heading of every step.
    pub pdr_covariance: [[f64; 2]; 2],
    /// Observation σ used when an observation carries no covariance, metres.
    pub gnss_noise_m: f64,
    pub wifi_noise_m: f64,
    pub pdr_noise_m: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            pdr_covariance: [[0.1, 0.0], [0.0, 2.0]],
            gnss_noise_m: 5.0,
            wifi_noise_m: 4.0,
            pdr_noise_m: 1.0,
        }
    }
}

impl KalmanConfig {
    pub fn pdr_covariance(&self) -> Covariance {
        let c = &self.pdr_covariance;
        Covariance::new(c[0][0], c[0][1], c[1][0], c[1][1])
    }

    pub fn observation_noise(&self, source: SensorSource) -> Covariance {
        isotropic(match source {
            SensorSource::Gnss => self.gnss_noise_m,
            SensorSource::Wifi => self.wifi_noise_m,
            SensorSource::Pdr => self.pdr_noise_m,
        })
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        if !is_valid_covariance(&self.pdr_covariance()) {
            return Err(FilterError::config(
                "kalman.pdr_covariance must be symmetric positive semi-definite",
            ));
        }
        require_positive("kalman.gnss_noise_m", self.gnss_noise_m)?;
        require_positive("kalman.wifi_noise_m", self.wifi_noise_m)?;
        require_positive("kalman.pdr_noise_m", self.pdr_noise_m)
    }
}

/// Extended Kalman filter, geodetic state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EkfConfig {
    /// Per-step PDR process noise σ, metres.
    pub pdr_noise_m: f64,
    /// Per-source observation σ, metres.
    pub gnss_noise_m: f64,
    pub wifi_noise_m: f64,
    /// Compose PDR steps on the regional grid (British National Grid or
    /// UTM) instead of the local metres-per-degree scale.
    pub grid_displacement: bool,
}

impl Default for EkfConfig {
    fn default() -> Self {
        Self {
            pdr_noise_m: 1.0,
            gnss_noise_m: 4.0,
            wifi_noise_m: 4.0,
            grid_displacement: false,
        }
    }
}

impl EkfConfig {
    pub fn process_noise(&self) -> Covariance {
        isotropic(self.pdr_noise_m)
    }

    /// Diagonal `R` for a source: `R_gnss`, `R_wifi`, and `R_pdr` for PDR
    /// pseudo-observations.
    pub fn observation_noise(&self, source: SensorSource) -> Covariance {
        isotropic(match source {
            SensorSource::Gnss => self.gnss_noise_m,
            SensorSource::Wifi => self.wifi_noise_m,
            SensorSource::Pdr => self.pdr_noise_m,
        })
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        require_positive("ekf.pdr_noise_m", self.pdr_noise_m)?;
        require_positive("ekf.gnss_noise_m", self.gnss_noise_m)?;
        require_positive("ekf.wifi_noise_m", self.wifi_noise_m)
    }
}

/// Particle filter, geodetic particles. Noise magnitudes are in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParticleConfig {
    /// Number of particles, fixed for the filter's lifetime.
    pub count: usize,
    /// Likelihood kernel σ per source, degrees.
    pub wifi_noise: f64,
    pub gnss_noise: f64,
    pub pdr_noise: f64,
    /// σ of the random-walk perturbation applied every motion update, degrees.
    pub motion_noise: f64,
    /// Seed for reproducible runs; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            count: 1000,
            wifi_noise: 2.5e-3,
            gnss_noise: 2.5e-3,
            pdr_noise: 2.0e-3,
            motion_noise: 1e-5,
            seed: None,
        }
    }
}

impl ParticleConfig {
    pub fn noise(&self, source: SensorSource) -> f64 {
        match source {
            SensorSource::Gnss => self.gnss_noise,
            SensorSource::Wifi => self.wifi_noise,
            SensorSource::Pdr => self.pdr_noise,
        }
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        if self.count == 0 {
            return Err(FilterError::config("particle.count must be at least 1"));
        }
        require_positive("particle.wifi_noise", self.wifi_noise)?;
        require_positive("particle.gnss_noise", self.gnss_noise)?;
        require_positive("particle.pdr_noise", self.pdr_noise)?;
        if !self.motion_noise.is_finite() || self.motion_noise < 0.0 {
            return Err(FilterError::config(
                "particle.motion_noise must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

fn require_positive(name: &str, value: f64) -> Result<(), FilterError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(FilterError::config(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FilterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.particle.count, 1000);
        assert_eq!(config.kind, FilterKind::Extended);
    }

    #[test]
    fn empty_table_deserializes_to_defaults() {
        let config: FilterConfig = toml::from_str("").unwrap();
        assert_eq!(config, FilterConfig::default());
    }

    #[test]
    fn partial_table_overrides_only_given_fields() {
        let config: FilterConfig = toml::from_str(
            r#"
            kind = "particle"
            [particle]
            count = 250
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.kind, FilterKind::Particle);
        assert_eq!(config.particle.count, 250);
        assert_eq!(config.particle.seed, Some(42));
        assert_eq!(config.particle.gnss_noise, ParticleConfig::default().gnss_noise);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<FilterConfig, _> = toml::from_str("particles = 10");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = FilterConfig::default();
        config.ekf.gnss_noise_m = 0.0;
        assert!(matches!(
            config.validate(),
            Err(FilterError::Configuration(_))
        ));

        let mut config = FilterConfig::default();
        config.particle.count = 0;
        assert!(config.validate().is_err());

        let mut config = FilterConfig::default();
        config.output_alpha = Some(1.5);
        assert!(config.validate().is_err());

        let mut config = FilterConfig::default();
        config.kalman.pdr_covariance = [[1.0, 3.0], [3.0, 1.0]];
        assert!(config.validate().is_err());
    }
}
