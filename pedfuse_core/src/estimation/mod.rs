// pedfuse_core/src/estimation/mod.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::FilterConfig;
use crate::error::FilterError;
use crate::frames::ReferenceFrame;
use crate::messages::{ControlInput, Estimate, FusionInput, Observation};
use crate::types::{Covariance, Position};

pub mod filters;
pub mod linalg;

use filters::ekf::ExtendedKalmanEstimator;
use filters::kalman::LinearKalmanEstimator;
use filters::particle::ParticleEstimator;

/// The three interchangeable estimator variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Kalman,
    #[default]
    Extended,
    Particle,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterKind::Kalman => "kalman",
            FilterKind::Extended => "extended",
            FilterKind::Particle => "particle",
        };
        f.write_str(name)
    }
}

/// The contract every position estimator fulfils.
///
/// `predict` and `update` either commit a new state and return it, or fail
/// and leave the previous state untouched. Accessors return copies.
pub trait PositionFilter: Send + Sync {
    fn kind(&self) -> FilterKind;

    /// Discards all history and restarts from the given belief.
    fn reset(&mut self, position: Position, covariance: Covariance) -> Result<(), FilterError>;

    /// Motion update from one PDR displacement.
    fn predict(&mut self, control: &ControlInput) -> Result<Estimate, FilterError>;

    /// Bayesian correction against one observation.
    fn update(&mut self, observation: &Observation) -> Result<Estimate, FilterError>;

    /// The current position estimate.
    fn position(&self) -> Position;

    /// The current covariance, in metres² east/north.
    fn covariance(&self) -> Covariance;

    /// Single entry point for message-driven callers.
    fn process(&mut self, input: FusionInput<'_>) -> Result<Estimate, FilterError> {
        match input {
            FusionInput::Control(control) => self.predict(control),
            FusionInput::Observation(observation) => self.update(observation),
        }
    }
}

// =========================================================================
// == Tagged Variant ==
// =========================================================================

/// One of the three estimators, chosen at runtime from configuration.
#[derive(Debug, Clone)]
pub enum Estimator {
    Kalman(LinearKalmanEstimator),
    Extended(ExtendedKalmanEstimator),
    Particle(ParticleEstimator),
}

impl Estimator {
    /// Builds the configured variant, starting at the frame's anchor.
    pub fn from_config(config: &FilterConfig, frame: ReferenceFrame) -> Result<Self, FilterError> {
        config.validate()?;
        let initial_cov = config.initial_covariance();
        let estimator = match config.kind {
            FilterKind::Kalman => Estimator::Kalman(LinearKalmanEstimator::new(
                frame,
                Position::local(0.0, 0.0),
                initial_cov,
                config.kalman.clone(),
            )?),
            FilterKind::Extended => Estimator::Extended(ExtendedKalmanEstimator::new(
                frame,
                frame.anchor(),
                initial_cov,
                config.ekf.clone(),
            )?),
            FilterKind::Particle => Estimator::Particle(ParticleEstimator::new(
                frame,
                frame.anchor(),
                initial_cov,
                config.particle.clone(),
            )?),
        };
        Ok(estimator)
    }

    fn inner(&self) -> &dyn PositionFilter {
        match self {
            Estimator::Kalman(f) => f,
            Estimator::Extended(f) => f,
            Estimator::Particle(f) => f,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn PositionFilter {
        match self {
            Estimator::Kalman(f) => f,
            Estimator::Extended(f) => f,
            Estimator::Particle(f) => f,
        }
    }
}

impl PositionFilter for Estimator {
    fn kind(&self) -> FilterKind {
        self.inner().kind()
    }

    fn reset(&mut self, position: Position, covariance: Covariance) -> Result<(), FilterError> {
        self.inner_mut().reset(position, covariance)
    }

    fn predict(&mut self, control: &ControlInput) -> Result<Estimate, FilterError> {
        self.inner_mut().predict(control)
    }

    fn update(&mut self, observation: &Observation) -> Result<Estimate, FilterError> {
        self.inner_mut().update(observation)
    }

    fn position(&self) -> Position {
        self.inner().position()
    }

    fn covariance(&self) -> Covariance {
        self.inner().covariance()
    }
}
