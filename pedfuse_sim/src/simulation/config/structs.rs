// pedfuse_sim/src/simulation/config/structs.rs

use pedfuse_core::config::FilterConfig;
use pedfuse_core::types::GeoPoint;
use serde::{Deserialize, Serialize};

// =========================================================================
// == Top-Level Scenario Configuration ==
// =========================================================================

/// # ScenarioConfig
/// The root of the data parsed from a `scenario.toml` file. Every section is
/// optional and falls back to its defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    pub simulation: Simulation,
    pub walk: Walk,
    pub sensors: Sensors,
    /// Passed straight to the fusion core.
    pub filter: FilterConfig,
}

// =========================================================================
// == Configuration Sub-Structs ==
// These map directly to the sections in a scenario.toml file.
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Simulation {
    /// Optional seed for the pseudo-random number generator for determinism.
    pub seed: Option<u64>,
    /// Duration of the walk in seconds.
    pub duration_seconds: f64,
    /// Window of the weighted moving average applied to the fused track.
    pub smoothing_window: usize,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            seed: None,
            duration_seconds: 300.0,
            smoothing_window: 5,
        }
    }
}

/// The ground-truth pedestrian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Walk {
    /// Where the walk starts; also the anchor of the local frame.
    pub anchor: GeoPoint,
    pub step_length_m: f64,
    /// Steps per second.
    pub cadence_hz: f64,
    /// Initial heading, degrees clockwise from north.
    pub initial_heading_deg: f64,
    /// Per-step heading random walk σ, degrees.
    pub heading_wander_deg: f64,
}

impl Default for Walk {
    fn default() -> Self {
        Self {
            anchor: GeoPoint::new(55.9444, -3.1870),
            step_length_m: 0.7,
            cadence_hz: 1.8,
            initial_heading_deg: 0.0,
            heading_wander_deg: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sensors {
    pub pdr: PdrSensorConfig,
    pub gnss: FixSensorConfig,
    pub wifi: FixSensorConfig,
}

impl Default for Sensors {
    fn default() -> Self {
        Self {
            pdr: PdrSensorConfig::default(),
            gnss: FixSensorConfig::default(),
            wifi: FixSensorConfig {
                rate_hz: 0.2,
                noise_m: 4.0,
                dropout_probability: 0.1,
                ..Default::default()
            },
        }
    }
}

/// Systematic errors of the step detector and heading estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PdrSensorConfig {
    /// Relative step-length error, e.g. 0.05 overestimates every step by 5 %.
    pub step_length_scale_error: f64,
    pub initial_heading_bias_deg: f64,
    /// Per-step random walk σ of the heading bias, degrees.
    pub heading_bias_drift_deg: f64,
}

impl Default for PdrSensorConfig {
    fn default() -> Self {
        Self {
            step_length_scale_error: 0.05,
            initial_heading_bias_deg: 2.0,
            heading_bias_drift_deg: 0.1,
        }
    }
}

/// A periodic absolute position source (GNSS or WiFi).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixSensorConfig {
    pub enabled: bool,
    pub rate_hz: f64,
    /// Horizontal noise σ per axis, metres.
    pub noise_m: f64,
    /// Chance that a scheduled fix is lost.
    pub dropout_probability: f64,
    /// Attach the noise σ to every fix as its reported accuracy.
    pub report_accuracy: bool,
}

impl Default for FixSensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_hz: 1.0,
            noise_m: 5.0,
            dropout_probability: 0.2,
            report_accuracy: true,
        }
    }
}
