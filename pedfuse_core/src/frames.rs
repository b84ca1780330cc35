// pedfuse_core/src/frames.rs

//! The local tangent-plane frame every filter shares, plus the regional grid
//! projections in [`projection`].

pub mod projection;

use crate::error::FilterError;
use crate::types::{wrap_longitude, GeoPoint, LocalPoint, Position};

/// Metres per degree of latitude used by the local frame.
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Smallest `|cos(latitude)|` used as a divisor; closer to the poles the
/// longitude scale is clamped instead of blowing up.
pub const MIN_COS_LATITUDE: f64 = 1e-10;

/// `cos(latitude)` clamped away from zero, keeping its sign.
pub fn clamped_cos(latitude_deg: f64) -> f64 {
    let c = latitude_deg.to_radians().cos();
    if c.abs() < MIN_COS_LATITUDE {
        MIN_COS_LATITUDE.copysign(c)
    } else {
        c
    }
}

/// Local scale at a latitude: `(metres per degree north, metres per degree east)`.
pub fn meters_per_degree(latitude_deg: f64) -> (f64, f64) {
    (
        METERS_PER_DEGREE_LAT,
        METERS_PER_DEGREE_LAT * clamped_cos(latitude_deg),
    )
}

/// Metres per radian of latitude, the `R` in the linearized motion model.
pub fn meters_per_radian_lat() -> f64 {
    METERS_PER_DEGREE_LAT.to_degrees()
}

// =========================================================================
// == Reference Frame ==
// =========================================================================

/// A local east/north metric frame anchored at a fixed geodetic point.
///
/// The anchor is fixed for the frame's lifetime; re-anchoring means building
/// a new frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceFrame {
    anchor: GeoPoint,
}

impl ReferenceFrame {
    pub fn new(anchor: GeoPoint) -> Result<Self, FilterError> {
        if !anchor.is_valid() {
            return Err(FilterError::invalid(format!(
                "reference anchor {:?} is not a valid fix",
                anchor
            )));
        }
        Ok(Self { anchor })
    }

    pub fn anchor(&self) -> GeoPoint {
        self.anchor
    }

    /// Geodetic to local metres. Longitude is scaled by the cosine of the
    /// mean of anchor and target latitude.
    pub fn to_local(&self, point: &GeoPoint) -> LocalPoint {
        let cos_avg = clamped_cos((self.anchor.latitude + point.latitude) / 2.0);
        let east =
            wrap_longitude(point.longitude - self.anchor.longitude) * METERS_PER_DEGREE_LAT * cos_avg;
        let north = (point.latitude - self.anchor.latitude) * METERS_PER_DEGREE_LAT;
        LocalPoint::new(east, north)
    }

    /// Local metres to geodetic. Latitude is recovered first so that the
    /// mean latitude used for the longitude scale matches `to_local` exactly.
    pub fn to_geodetic(&self, local: &LocalPoint) -> GeoPoint {
        let latitude = self.anchor.latitude + local.y / METERS_PER_DEGREE_LAT;
        let cos_avg = clamped_cos((self.anchor.latitude + latitude) / 2.0);
        let longitude = self.anchor.longitude + local.x / (METERS_PER_DEGREE_LAT * cos_avg);
        GeoPoint::new(latitude, wrap_longitude(longitude))
    }

    pub fn resolve_local(&self, position: &Position) -> LocalPoint {
        match position {
            Position::Local(p) => *p,
            Position::Geodetic(g) => self.to_local(g),
        }
    }

    pub fn resolve_geodetic(&self, position: &Position) -> GeoPoint {
        match position {
            Position::Geodetic(g) => *g,
            Position::Local(p) => self.to_geodetic(p),
        }
    }

    /// `resolve_geodetic`, failing when the result is not a real fix. A
    /// finite local offset can still land beyond a pole.
    pub fn checked_geodetic(&self, position: &Position) -> Result<GeoPoint, FilterError> {
        let geo = self.resolve_geodetic(position);
        if geo.is_valid() {
            Ok(geo)
        } else {
            Err(FilterError::invalid(format!(
                "{position:?} does not resolve to a valid fix, got {geo:?}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DEG_EPSILON: f64 = 1e-6;

    fn assert_round_trip(anchor: GeoPoint) {
        let frame = ReferenceFrame::new(anchor).unwrap();
        let offsets = [
            (0.0, 0.0),
            (250.0, -120.0),
            (-3_000.0, 4_000.0),
            (7_000.0, 7_000.0),
            (-9_900.0, -50.0),
        ];
        for (east, north) in offsets {
            let local = LocalPoint::new(east, north);
            let geo = frame.to_geodetic(&local);
            let local_back = frame.to_local(&geo);
            assert_abs_diff_eq!(local_back.x, east, epsilon = 1e-6);
            assert_abs_diff_eq!(local_back.y, north, epsilon = 1e-6);

            let geo_back = frame.to_geodetic(&frame.to_local(&geo));
            assert_abs_diff_eq!(geo_back.latitude, geo.latitude, epsilon = DEG_EPSILON);
            assert_abs_diff_eq!(geo_back.longitude, geo.longitude, epsilon = DEG_EPSILON);
        }
    }

    #[test]
    fn round_trip_at_equator() {
        assert_round_trip(GeoPoint::new(0.0, 32.58));
    }

    #[test]
    fn round_trip_in_london() {
        assert_round_trip(GeoPoint::new(51.5074, -0.1278));
    }

    #[test]
    fn round_trip_near_pole() {
        assert_round_trip(GeoPoint::new(80.0, 15.6));
    }

    #[test]
    fn anchor_maps_to_origin() {
        let anchor = GeoPoint::new(55.9227, -3.1746);
        let frame = ReferenceFrame::new(anchor).unwrap();
        let origin = frame.to_local(&anchor);
        assert_abs_diff_eq!(origin.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(origin.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn one_degree_north_is_111km() {
        let frame = ReferenceFrame::new(GeoPoint::new(10.0, 10.0)).unwrap();
        let local = frame.to_local(&GeoPoint::new(11.0, 10.0));
        assert_abs_diff_eq!(local.y, METERS_PER_DEGREE_LAT, epsilon = 1e-6);
        assert_abs_diff_eq!(local.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn polar_cosine_is_clamped() {
        assert_eq!(clamped_cos(90.0), MIN_COS_LATITUDE);
        let (_, east) = meters_per_degree(90.0);
        assert!(east > 0.0 && east.is_finite());
    }

    #[test]
    fn antimeridian_offsets_wrap() {
        let frame = ReferenceFrame::new(GeoPoint::new(60.0, 179.9995)).unwrap();
        let geo = frame.to_geodetic(&LocalPoint::new(100.0, 0.0));
        assert!(geo.is_valid());
        assert!(geo.longitude < -179.99);
        let back = frame.to_local(&geo);
        assert_abs_diff_eq!(back.x, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn far_local_offsets_fail_the_checked_resolve() {
        let frame = ReferenceFrame::new(GeoPoint::new(55.9227, -3.1746)).unwrap();
        assert!(frame.checked_geodetic(&Position::local(120.0, -40.0)).is_ok());
        assert!(matches!(
            frame.checked_geodetic(&Position::local(0.0, 1e8)),
            Err(FilterError::InvalidInput(_))
        ));
        assert!(frame.checked_geodetic(&Position::geodetic(91.0, 0.0)).is_err());
    }

    #[test]
    fn invalid_anchor_is_rejected() {
        assert!(ReferenceFrame::new(GeoPoint::new(0.0, 0.0)).is_err());
        assert!(ReferenceFrame::new(GeoPoint::new(91.0, 0.0)).is_err());
    }
}
