// pedfuse_core/src/types.rs

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

// --- Core Type Aliases ---
/// A point in the local tangent plane, in metres. `x` is east, `y` is north.
pub type LocalPoint = Vector2<f64>;
/// A 2x2 position covariance, always in metres² in the local east/north frame.
pub type Covariance = Matrix2<f64>;

/// Below this magnitude on both axes a geodetic fix is treated as the
/// "null island" placeholder that sensors emit when they have no fix.
pub const NULL_FIX_EPSILON: f64 = 1e-9;

/// Tolerance used when checking a covariance for symmetry and PSD-ness.
const COVARIANCE_TOLERANCE: f64 = 1e-9;

// =========================================================================
// == Geodetic Coordinates ==
// =========================================================================

/// A WGS84 latitude/longitude pair, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// A fix is valid when both components are finite, inside the WGS84
    /// ranges, and not the (0, 0) placeholder.
    pub fn is_valid(&self) -> bool {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return false;
        }
        if self.latitude.abs() < NULL_FIX_EPSILON && self.longitude.abs() < NULL_FIX_EPSILON {
            return false;
        }
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Clamps latitude to the poles and wraps longitude across the
    /// antimeridian, so a step taken near either stays on the globe.
    pub fn normalized(self) -> Self {
        Self::new(
            self.latitude.clamp(-90.0, 90.0),
            wrap_longitude(self.longitude),
        )
    }

    /// Returns the point as `[latitude, longitude]`.
    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.latitude, self.longitude)
    }

    pub fn from_vector(v: &Vector2<f64>) -> Self {
        Self::new(v.x, v.y)
    }
}

// =========================================================================
// == Unit-Tagged Position ==
// =========================================================================

/// A position in either of the two unit systems the engine works in.
/// Converting between them always goes through a `ReferenceFrame`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    /// Latitude/longitude in degrees.
    Geodetic(GeoPoint),
    /// East/north offset from the reference anchor, in metres.
    Local(LocalPoint),
}

impl Position {
    pub fn geodetic(latitude: f64, longitude: f64) -> Self {
        Position::Geodetic(GeoPoint::new(latitude, longitude))
    }

    pub fn local(east: f64, north: f64) -> Self {
        Position::Local(LocalPoint::new(east, north))
    }

    /// Geodetic positions follow `GeoPoint::is_valid`. Local positions only
    /// need to be finite: the local origin is the anchor itself.
    pub fn is_valid(&self) -> bool {
        match self {
            Position::Geodetic(p) => p.is_valid(),
            Position::Local(p) => p.x.is_finite() && p.y.is_finite(),
        }
    }

    pub fn as_geodetic(&self) -> Option<GeoPoint> {
        match self {
            Position::Geodetic(p) => Some(*p),
            Position::Local(_) => None,
        }
    }

    pub fn as_local(&self) -> Option<LocalPoint> {
        match self {
            Position::Local(p) => Some(*p),
            Position::Geodetic(_) => None,
        }
    }
}

impl From<GeoPoint> for Position {
    fn from(p: GeoPoint) -> Self {
        Position::Geodetic(p)
    }
}

impl From<LocalPoint> for Position {
    fn from(p: LocalPoint) -> Self {
        Position::Local(p)
    }
}

// =========================================================================
// == Covariance Helpers ==
// =========================================================================

/// Checks the invariants every covariance handed to a filter must satisfy:
/// finite, symmetric, non-negative diagonal and non-negative determinant.
pub fn is_valid_covariance(cov: &Covariance) -> bool {
    if cov.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let scale = cov.amax().max(1.0);
    if (cov[(0, 1)] - cov[(1, 0)]).abs() > COVARIANCE_TOLERANCE * scale {
        return false;
    }
    if cov[(0, 0)] < 0.0 || cov[(1, 1)] < 0.0 {
        return false;
    }
    cov.determinant() >= -COVARIANCE_TOLERANCE * scale * scale
}

/// An isotropic covariance `sigma² · I`.
pub fn isotropic(sigma: f64) -> Covariance {
    Covariance::identity() * sigma * sigma
}

/// Wraps a longitude, or a difference of longitudes, into `[-180, 180)`.
pub fn wrap_longitude(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

/// Forces exact symmetry; small asymmetries creep in through the update step.
pub fn symmetrize(cov: &Covariance) -> Covariance {
    (cov + cov.transpose()) * 0.5
}
