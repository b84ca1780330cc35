// pedfuse_core/src/estimation/filters/ekf.rs

use nalgebra::Matrix2;
use tracing::debug;

use crate::config::EkfConfig;
use crate::error::FilterError;
use crate::estimation::linalg::invert_2x2;
use crate::estimation::{FilterKind, PositionFilter};
use crate::frames::projection::GridProjection;
use crate::frames::{clamped_cos, meters_per_degree, meters_per_radian_lat, ReferenceFrame};
use crate::messages::{ControlInput, Estimate, Observation};
use crate::types::{
    is_valid_covariance, symmetrize, wrap_longitude, Covariance, GeoPoint, LocalPoint, Position,
};

/// An Extended Kalman Filter whose state is a geodetic position.
///
/// The state lives in degrees but the covariance is an error covariance in
/// metres east/north around that state. The motion model is nonlinear in
/// latitude, so the predict step propagates the covariance through its
/// Jacobian; the update step maps the angular innovation into metres with the
/// local scale at the current latitude.
#[derive(Debug, Clone)]
pub struct ExtendedKalmanEstimator {
    frame: ReferenceFrame,
    config: EkfConfig,
    /// Set when PDR steps are composed on a regional grid.
    grid: Option<GridProjection>,
    /// The current state of the filter (x, P, t).
    position: GeoPoint,
    covariance: Covariance,
    timestamp: f64,
}

impl ExtendedKalmanEstimator {
    pub fn new(
        frame: ReferenceFrame,
        position: GeoPoint,
        covariance: Covariance,
        config: EkfConfig,
    ) -> Result<Self, FilterError> {
        config.validate()?;
        let grid = if config.grid_displacement {
            let anchor = frame.anchor();
            Some(GridProjection::for_location(anchor.latitude, anchor.longitude)?)
        } else {
            None
        };
        let mut filter = Self {
            frame,
            config,
            grid,
            position: frame.anchor(),
            covariance: Covariance::identity(),
            timestamp: 0.0,
        };
        filter.reset(Position::Geodetic(position), covariance)?;
        Ok(filter)
    }

    pub fn geodetic(&self) -> GeoPoint {
        self.position
    }

    /// The position in the filter's local frame.
    pub fn local(&self) -> LocalPoint {
        self.frame.to_local(&self.position)
    }

    /// One full fusion cycle: dead-reckon with the PDR step, then correct
    /// with whichever of the GNSS and WiFi fixes are present and valid.
    ///
    /// A rejected fix is skipped without failing the cycle. Only a failed
    /// motion update is returned as an error.
    pub fn fuse(
        &mut self,
        control: Option<&ControlInput>,
        gnss: Option<&Observation>,
        wifi: Option<&Observation>,
    ) -> Result<Estimate, FilterError> {
        if let Some(control) = control {
            self.predict(control)?;
        }
        for observation in [gnss, wifi].into_iter().flatten() {
            if let Err(e) = self.update(observation) {
                debug!(source = %observation.source, error = %e, "skipping observation");
            }
        }
        Ok(self.estimate())
    }

    /// Jacobian of the geodetic motion model with respect to the metric
    /// error state, for an eastward step `dx` taken at `latitude`.
    fn motion_jacobian(latitude: f64, dx: f64) -> Matrix2<f64> {
        let tan_lat = latitude.to_radians().sin() / clamped_cos(latitude);
        Matrix2::new(1.0, dx * tan_lat / meters_per_radian_lat(), 0.0, 1.0)
    }

    fn commit(
        &mut self,
        position: GeoPoint,
        covariance: Covariance,
        timestamp: f64,
    ) -> Result<Estimate, FilterError> {
        if !position.is_valid() {
            return Err(FilterError::invalid(format!(
                "ekf step produced an invalid position {position:?}"
            )));
        }
        if !covariance.iter().all(|v| v.is_finite()) {
            return Err(FilterError::NumericalDegeneracy(
                "ekf step produced a non-finite covariance".to_string(),
            ));
        }
        self.position = position;
        self.covariance = covariance;
        self.timestamp = timestamp;
        Ok(self.estimate())
    }

    fn estimate(&self) -> Estimate {
        Estimate {
            position: Position::Geodetic(self.position),
            covariance: self.covariance,
            timestamp: self.timestamp,
        }
    }
}

// --- The Public Trait Implementation ---
impl PositionFilter for ExtendedKalmanEstimator {
    fn kind(&self) -> FilterKind {
        FilterKind::Extended
    }

    fn reset(&mut self, position: Position, covariance: Covariance) -> Result<(), FilterError> {
        let geo = self.frame.resolve_geodetic(&position);
        if !geo.is_valid() {
            return Err(FilterError::invalid(format!(
                "cannot reset to invalid position {position:?}"
            )));
        }
        if !is_valid_covariance(&covariance) {
            return Err(FilterError::invalid(format!(
                "cannot reset with invalid covariance {covariance:?}"
            )));
        }
        self.position = geo;
        self.covariance = covariance;
        self.timestamp = 0.0;
        Ok(())
    }

    fn predict(&mut self, control: &ControlInput) -> Result<Estimate, FilterError> {
        control.validate()?;
        let dx = control.displacement.x;
        let dy = control.displacement.y;
        let (north_scale, east_scale) = meters_per_degree(self.position.latitude);

        // 1. Propagate the state through the nonlinear motion model.
        let predicted = match &self.grid {
            Some(grid) => grid.apply_displacement(&self.position, dx, dy),
            None => GeoPoint::new(
                self.position.latitude + dy / north_scale,
                self.position.longitude + dx / east_scale,
            ),
        }
        .normalized();

        // 2. Linearize and propagate the covariance: P = F·P·Fᵀ + Q
        let f = Self::motion_jacobian(self.position.latitude, dx);
        let p = f * self.covariance * f.transpose() + self.config.process_noise();

        debug!(?predicted, "ekf predict");
        self.commit(predicted, symmetrize(&p), control.timestamp)
    }

    fn update(&mut self, observation: &Observation) -> Result<Estimate, FilterError> {
        if let Err(e) = observation.validate() {
            debug!(source = %observation.source, error = %e, "rejecting observation");
            return Err(e);
        }
        let z = self.frame.checked_geodetic(&observation.position)?;
        let r = observation
            .covariance
            .unwrap_or_else(|| self.config.observation_noise(observation.source));
        let (north_scale, east_scale) = meters_per_degree(self.position.latitude);

        // 1. Innovation, mapped from degrees into metres east/north.
        let y = LocalPoint::new(
            wrap_longitude(z.longitude - self.position.longitude) * east_scale,
            (z.latitude - self.position.latitude) * north_scale,
        );

        // 2. Innovation covariance and gain.
        let s = self.covariance + r;
        let s_inv = invert_2x2(&s)?;
        let k = self.covariance * s_inv;

        // 3. Correct the state and covariance.
        let correction = k * y;
        let corrected = GeoPoint::new(
            self.position.latitude + correction.y / north_scale,
            self.position.longitude + correction.x / east_scale,
        )
        .normalized();
        let p = (Covariance::identity() - k) * self.covariance;

        debug!(source = %observation.source, ?corrected, "ekf update");
        self.commit(corrected, symmetrize(&p), observation.timestamp)
    }

    fn position(&self) -> Position {
        Position::Geodetic(self.position)
    }

    fn covariance(&self) -> Covariance {
        self.covariance
    }
}
