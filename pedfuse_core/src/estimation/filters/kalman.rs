// pedfuse_core/src/estimation/filters/kalman.rs

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::config::KalmanConfig;
use crate::error::FilterError;
use crate::estimation::linalg::{heading_aligned, inverse_or_pseudo};
use crate::estimation::{FilterKind, PositionFilter};
use crate::frames::ReferenceFrame;
use crate::messages::{ControlInput, Estimate, Observation};
use crate::types::{is_valid_covariance, symmetrize, Covariance, LocalPoint, Position};

/// Substituted for a non-positive time step.
pub const MIN_DT: f64 = 1e-3;

/// Dynamically-shaped matrices for one generic Kalman step.
///
/// The state is always the 2-D local position, so `F` and `Q` are 2x2, `B`
/// is 2xm for an m-dimensional control, `H` is kx2 and `R` is kxk for a
/// k-dimensional observation.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub f: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub h: DMatrix<f64>,
    pub q: DMatrix<f64>,
    pub r: DMatrix<f64>,
}

impl LinearModel {
    /// The pedestrian model: `x' = x + Δt·v`, `z = x`.
    pub fn constant_velocity(dt: f64, q: &Covariance, r: &Covariance) -> Self {
        Self {
            f: DMatrix::identity(2, 2),
            b: DMatrix::identity(2, 2) * dt,
            h: DMatrix::identity(2, 2),
            q: DMatrix::from_column_slice(2, 2, q.as_slice()),
            r: DMatrix::from_column_slice(2, 2, r.as_slice()),
        }
    }

    fn check_shapes(&self, control_dim: usize, observation_dim: usize) -> Result<(), FilterError> {
        let expect = |name: &str, m: &DMatrix<f64>, rows: usize, cols: usize| {
            if m.shape() == (rows, cols) {
                Ok(())
            } else {
                Err(FilterError::config(format!(
                    "{name} is {}x{}, expected {rows}x{cols}",
                    m.nrows(),
                    m.ncols()
                )))
            }
        };
        expect("F", &self.f, 2, 2)?;
        expect("B", &self.b, 2, control_dim)?;
        expect("H", &self.h, observation_dim, 2)?;
        expect("Q", &self.q, 2, 2)?;
        expect("R", &self.r, observation_dim, observation_dim)
    }
}

/// A linear Kalman filter over the 2-D local position, driven by PDR
/// velocity and corrected by position fixes.
#[derive(Debug, Clone)]
pub struct LinearKalmanEstimator {
    frame: ReferenceFrame,
    config: KalmanConfig,
    position: LocalPoint,
    covariance: Covariance,
    timestamp: f64,
}

impl LinearKalmanEstimator {
    pub fn new(
        frame: ReferenceFrame,
        position: Position,
        covariance: Covariance,
        config: KalmanConfig,
    ) -> Result<Self, FilterError> {
        config.validate()?;
        let mut filter = Self {
            frame,
            config,
            position: LocalPoint::zeros(),
            covariance: Covariance::identity(),
            timestamp: 0.0,
        };
        filter.reset(position, covariance)?;
        Ok(filter)
    }

    pub fn frame(&self) -> &ReferenceFrame {
        &self.frame
    }

    /// One combined predict/correct step with caller-supplied model matrices.
    ///
    /// Every shape is checked before any arithmetic; a mismatch returns
    /// `FilterError::Configuration` and the state is left as it was.
    pub fn step(
        &mut self,
        control: &[f64],
        observation: &[f64],
        model: &LinearModel,
    ) -> Result<Estimate, FilterError> {
        model.check_shapes(control.len(), observation.len())?;
        if control.iter().chain(observation).any(|v| !v.is_finite()) {
            return Err(FilterError::invalid("step inputs must be finite"));
        }

        let x = DVector::from_column_slice(self.position.as_slice());
        let p = DMatrix::from_column_slice(2, 2, self.covariance.as_slice());
        let u = DVector::from_column_slice(control);
        let z = DVector::from_column_slice(observation);

        // 1. Motion update.
        let x_pred = &model.f * &x + &model.b * &u;
        let p_pred = &model.f * &p * model.f.transpose() + &model.q;

        // 2. Innovation and its covariance.
        let y = &z - &model.h * &x_pred;
        let s = &model.h * &p_pred * model.h.transpose() + &model.r;
        let s_inv = match s.clone().try_inverse() {
            Some(inv) => inv,
            None => s
                .pseudo_inverse(1e-12)
                .map_err(|e| FilterError::NumericalDegeneracy(e.to_string()))?,
        };

        // 3. Gain and correction.
        let k = &p_pred * model.h.transpose() * s_inv;
        let x_new = x_pred + &k * y;
        let p_new = (DMatrix::identity(2, 2) - &k * &model.h) * p_pred;

        let position = LocalPoint::new(x_new[0], x_new[1]);
        let covariance = symmetrize(&Covariance::new(
            p_new[(0, 0)],
            p_new[(0, 1)],
            p_new[(1, 0)],
            p_new[(1, 1)],
        ));
        self.commit(position, covariance, self.timestamp)
    }

    fn commit(
        &mut self,
        position: LocalPoint,
        covariance: Covariance,
        timestamp: f64,
    ) -> Result<Estimate, FilterError> {
        if !position.iter().all(|v| v.is_finite()) || !covariance.iter().all(|v| v.is_finite()) {
            return Err(FilterError::NumericalDegeneracy(
                "kalman step produced a non-finite state".to_string(),
            ));
        }
        self.position = position;
        self.covariance = covariance;
        self.timestamp = timestamp;
        Ok(self.estimate())
    }

    fn estimate(&self) -> Estimate {
        Estimate {
            position: Position::Local(self.position),
            covariance: self.covariance,
            timestamp: self.timestamp,
        }
    }
}

impl PositionFilter for LinearKalmanEstimator {
    fn kind(&self) -> FilterKind {
        FilterKind::Kalman
    }

    fn reset(&mut self, position: Position, covariance: Covariance) -> Result<(), FilterError> {
        if self.frame.checked_geodetic(&position).is_err() {
            return Err(FilterError::invalid(format!(
                "cannot reset to invalid position {position:?}"
            )));
        }
        if !is_valid_covariance(&covariance) {
            return Err(FilterError::invalid(format!(
                "cannot reset with invalid covariance {covariance:?}"
            )));
        }
        self.position = self.frame.resolve_local(&position);
        self.covariance = covariance;
        self.timestamp = 0.0;
        Ok(())
    }

    fn predict(&mut self, control: &ControlInput) -> Result<Estimate, FilterError> {
        control.validate()?;
        let dt = if control.dt <= 0.0 {
            warn!(dt = control.dt, "non-positive time step, using {MIN_DT} s");
            MIN_DT
        } else {
            control.dt
        };
        let velocity = control.velocity(dt);
        let q = heading_aligned(&self.config.pdr_covariance(), &velocity);

        // F = I, B = Δt·I
        let position = self.position + velocity * dt;
        let covariance = symmetrize(&(self.covariance + q));
        debug!(?position, "kalman predict");
        self.commit(position, covariance, control.timestamp)
    }

    fn update(&mut self, observation: &Observation) -> Result<Estimate, FilterError> {
        observation.validate()?;
        self.frame.checked_geodetic(&observation.position)?;
        let z = self.frame.resolve_local(&observation.position);
        let r = observation
            .covariance
            .unwrap_or_else(|| self.config.observation_noise(observation.source));

        // H = I
        let y = z - self.position;
        let s = self.covariance + r;
        let k = self.covariance * inverse_or_pseudo(&s)?;
        let position = self.position + k * y;
        let covariance = symmetrize(&((Covariance::identity() - k) * self.covariance));
        debug!(source = %observation.source, ?position, "kalman update");
        self.commit(position, covariance, observation.timestamp)
    }

    fn position(&self) -> Position {
        Position::Local(self.position)
    }

    fn covariance(&self) -> Covariance {
        self.covariance
    }
}
