// pedfuse_core/src/frames/projection.rs

//! Regional planar grids for composing PDR displacements with more accuracy
//! than the equirectangular local frame. The extended Kalman filter steps on
//! one of these when `ekf.grid_displacement` is set; the converters are also
//! usable on their own.
//!
//! Inside Great Britain the British National Grid (OSGB36) is used, anywhere
//! else the UTM zone containing the starting point. Both are transverse
//! Mercator projections and share one implementation.

use nalgebra::{Matrix3, Vector3};

use crate::error::FilterError;
use crate::types::GeoPoint;

/// Convergence threshold for the inverse meridional arc iteration, metres.
const ARC_TOLERANCE_M: f64 = 1e-5;
const MAX_ITERATIONS: usize = 32;

// =========================================================================
// == Ellipsoids & Datum Shift ==
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis, metres.
    pub a: f64,
    /// Semi-minor axis, metres.
    pub b: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        b: 6_356_752.314_245,
    };
    pub const AIRY_1830: Ellipsoid = Ellipsoid {
        a: 6_377_563.396,
        b: 6_356_256.909,
    };

    fn e2(&self) -> f64 {
        (self.a * self.a - self.b * self.b) / (self.a * self.a)
    }

    /// Geodetic (zero height) to earth-centred cartesian.
    fn to_cartesian(&self, lat: f64, lon: f64) -> Vector3<f64> {
        let e2 = self.e2();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let nu = self.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        Vector3::new(
            nu * cos_lat * lon.cos(),
            nu * cos_lat * lon.sin(),
            (1.0 - e2) * nu * sin_lat,
        )
    }

    /// Earth-centred cartesian to geodetic radians; height is discarded.
    fn to_geodetic(&self, xyz: &Vector3<f64>) -> (f64, f64) {
        let e2 = self.e2();
        let p = (xyz.x * xyz.x + xyz.y * xyz.y).sqrt();
        let lon = xyz.y.atan2(xyz.x);
        let mut lat = xyz.z.atan2(p * (1.0 - e2));
        for _ in 0..MAX_ITERATIONS {
            let sin_lat = lat.sin();
            let nu = self.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
            let next = (xyz.z + e2 * nu * sin_lat).atan2(p);
            let converged = (next - lat).abs() < 1e-12;
            lat = next;
            if converged {
                break;
            }
        }
        (lat, lon)
    }
}

/// A 7-parameter (position vector) Helmert transformation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Helmert {
    /// Translation, metres.
    pub t: [f64; 3],
    /// Rotations, arc-seconds.
    pub r: [f64; 3],
    /// Scale, parts per million.
    pub s_ppm: f64,
}

impl Helmert {
    /// WGS84 to OSGB36, as published by Ordnance Survey.
    pub const WGS84_TO_OSGB36: Helmert = Helmert {
        t: [-446.448, 125.157, -542.060],
        r: [-0.1502, -0.2470, -0.8421],
        s_ppm: 20.4894,
    };

    fn inverse(&self) -> Helmert {
        Helmert {
            t: [-self.t[0], -self.t[1], -self.t[2]],
            r: [-self.r[0], -self.r[1], -self.r[2]],
            s_ppm: -self.s_ppm,
        }
    }

    fn apply(&self, xyz: &Vector3<f64>) -> Vector3<f64> {
        let arcsec = std::f64::consts::PI / (180.0 * 3600.0);
        let (rx, ry, rz) = (self.r[0] * arcsec, self.r[1] * arcsec, self.r[2] * arcsec);
        let rotation = Matrix3::new(1.0, -rz, ry, rz, 1.0, -rx, -ry, rx, 1.0);
        let scale = 1.0 + self.s_ppm * 1e-6;
        Vector3::new(self.t[0], self.t[1], self.t[2]) + rotation * xyz * scale
    }
}

// =========================================================================
// == Transverse Mercator ==
// =========================================================================

/// Parameters of one transverse Mercator grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    pub ellipsoid: Ellipsoid,
    /// Scale factor on the central meridian.
    pub scale: f64,
    /// True origin, degrees.
    pub lat0: f64,
    pub lon0: f64,
    /// False origin, metres.
    pub false_easting: f64,
    pub false_northing: f64,
}

impl TransverseMercator {
    /// Meridional arc from `lat0` to `lat`, scaled by the grid scale factor.
    fn meridional_arc(&self, lat: f64) -> f64 {
        let Ellipsoid { a, b } = self.ellipsoid;
        let n = (a - b) / (a + b);
        let (n2, n3) = (n * n, n * n * n);
        let lat0 = self.lat0.to_radians();
        let d = lat - lat0;
        let s = lat + lat0;
        b * self.scale
            * ((1.0 + n + 1.25 * n2 + 1.25 * n3) * d
                - (3.0 * n + 3.0 * n2 + 21.0 / 8.0 * n3) * d.sin() * s.cos()
                + (15.0 / 8.0 * n2 + 15.0 / 8.0 * n3) * (2.0 * d).sin() * (2.0 * s).cos()
                - 35.0 / 24.0 * n3 * (3.0 * d).sin() * (3.0 * s).cos())
    }

    /// Radii of curvature `(nu, rho)` and `eta²` at a latitude.
    fn curvature(&self, lat: f64) -> (f64, f64, f64) {
        let a = self.ellipsoid.a * self.scale;
        let e2 = self.ellipsoid.e2();
        let sin2 = lat.sin().powi(2);
        let nu = a / (1.0 - e2 * sin2).sqrt();
        let rho = a * (1.0 - e2) / (1.0 - e2 * sin2).powf(1.5);
        (nu, rho, nu / rho - 1.0)
    }

    /// Latitude/longitude in radians, on this grid's ellipsoid, to easting/northing.
    fn forward(&self, lat: f64, lon: f64) -> GridPoint {
        let (nu, rho, eta2) = self.curvature(lat);
        let (sin_lat, cos_lat) = lat.sin_cos();
        let tan2 = lat.tan().powi(2);
        let tan4 = tan2 * tan2;
        let m = self.meridional_arc(lat);

        let i = m + self.false_northing;
        let ii = nu / 2.0 * sin_lat * cos_lat;
        let iii = nu / 24.0 * sin_lat * cos_lat.powi(3) * (5.0 - tan2 + 9.0 * eta2);
        let iiia = nu / 720.0 * sin_lat * cos_lat.powi(5) * (61.0 - 58.0 * tan2 + tan4);
        let iv = nu * cos_lat;
        let v = nu / 6.0 * cos_lat.powi(3) * (nu / rho - tan2);
        let vi = nu / 120.0
            * cos_lat.powi(5)
            * (5.0 - 18.0 * tan2 + tan4 + 14.0 * eta2 - 58.0 * tan2 * eta2);

        let dl = lon - self.lon0.to_radians();
        GridPoint {
            easting: self.false_easting + iv * dl + v * dl.powi(3) + vi * dl.powi(5),
            northing: i + ii * dl.powi(2) + iii * dl.powi(4) + iiia * dl.powi(6),
        }
    }

    /// Easting/northing to latitude/longitude in radians on this grid's ellipsoid.
    fn inverse(&self, grid: &GridPoint) -> (f64, f64) {
        let af = self.ellipsoid.a * self.scale;
        let dn = grid.northing - self.false_northing;

        let mut lat = dn / af + self.lat0.to_radians();
        for _ in 0..MAX_ITERATIONS {
            let residual = dn - self.meridional_arc(lat);
            if residual.abs() < ARC_TOLERANCE_M {
                break;
            }
            lat += residual / af;
        }

        let (nu, rho, eta2) = self.curvature(lat);
        let tan = lat.tan();
        let tan2 = tan * tan;
        let tan4 = tan2 * tan2;
        let sec = 1.0 / lat.cos();

        let vii = tan / (2.0 * rho * nu);
        let viii = tan / (24.0 * rho * nu.powi(3)) * (5.0 + 3.0 * tan2 + eta2 - 9.0 * tan2 * eta2);
        let ix = tan / (720.0 * rho * nu.powi(5)) * (61.0 + 90.0 * tan2 + 45.0 * tan4);
        let x = sec / nu;
        let xi = sec / (6.0 * nu.powi(3)) * (nu / rho + 2.0 * tan2);
        let xii = sec / (120.0 * nu.powi(5)) * (5.0 + 28.0 * tan2 + 24.0 * tan4);
        let xiia =
            sec / (5040.0 * nu.powi(7)) * (61.0 + 662.0 * tan2 + 1320.0 * tan4 + 720.0 * tan4 * tan2);

        let de = grid.easting - self.false_easting;
        let out_lat = lat - vii * de.powi(2) + viii * de.powi(4) - ix * de.powi(6);
        let out_lon = self.lon0.to_radians() + x * de - xi * de.powi(3) + xii * de.powi(5)
            - xiia * de.powi(7);
        (out_lat, out_lon)
    }
}

// =========================================================================
// == Public Grid API ==
// =========================================================================

/// A position on a regional grid, in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub easting: f64,
    pub northing: f64,
}

/// Which grid a projection resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    BritishNationalGrid,
    Utm { zone: u8, north: bool },
}

/// A WGS84 <-> regional grid converter, chosen once from a starting fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridProjection {
    kind: GridKind,
    projection: TransverseMercator,
    /// Datum shift applied before projecting, if the grid is not on WGS84.
    datum_shift: Option<Helmert>,
}

impl GridProjection {
    /// Picks the British National Grid for fixes inside Great Britain and the
    /// local UTM zone everywhere else.
    pub fn for_location(latitude: f64, longitude: f64) -> Result<Self, FilterError> {
        let point = GeoPoint::new(latitude, longitude);
        if !point.is_valid() {
            return Err(FilterError::invalid(format!(
                "cannot select a grid for {:?}",
                point
            )));
        }
        if is_in_great_britain(latitude, longitude) {
            Ok(Self::british_national_grid())
        } else {
            Ok(Self::utm(utm_zone(longitude), latitude >= 0.0))
        }
    }

    pub fn british_national_grid() -> Self {
        Self {
            kind: GridKind::BritishNationalGrid,
            projection: TransverseMercator {
                ellipsoid: Ellipsoid::AIRY_1830,
                scale: 0.999_601_271_7,
                lat0: 49.0,
                lon0: -2.0,
                false_easting: 400_000.0,
                false_northing: -100_000.0,
            },
            datum_shift: Some(Helmert::WGS84_TO_OSGB36),
        }
    }

    pub fn utm(zone: u8, north: bool) -> Self {
        Self {
            kind: GridKind::Utm { zone, north },
            projection: TransverseMercator {
                ellipsoid: Ellipsoid::WGS84,
                scale: 0.9996,
                lat0: 0.0,
                lon0: f64::from(zone) * 6.0 - 183.0,
                false_easting: 500_000.0,
                false_northing: if north { 0.0 } else { 10_000_000.0 },
            },
            datum_shift: None,
        }
    }

    pub fn kind(&self) -> GridKind {
        self.kind
    }

    /// WGS84 to grid easting/northing.
    pub fn to_grid(&self, point: &GeoPoint) -> GridPoint {
        let (lat, lon) = (point.latitude.to_radians(), point.longitude.to_radians());
        let (lat, lon) = match &self.datum_shift {
            Some(shift) => {
                let xyz = Ellipsoid::WGS84.to_cartesian(lat, lon);
                self.projection
                    .ellipsoid
                    .to_geodetic(&shift.apply(&xyz))
            }
            None => (lat, lon),
        };
        self.projection.forward(lat, lon)
    }

    /// Grid easting/northing back to WGS84.
    pub fn from_grid(&self, grid: &GridPoint) -> GeoPoint {
        let (lat, lon) = self.projection.inverse(grid);
        let (lat, lon) = match &self.datum_shift {
            Some(shift) => {
                let xyz = self.projection.ellipsoid.to_cartesian(lat, lon);
                Ellipsoid::WGS84.to_geodetic(&shift.inverse().apply(&xyz))
            }
            None => (lat, lon),
        };
        GeoPoint::new(lat.to_degrees(), lon.to_degrees())
    }

    /// Moves a WGS84 point by a metric east/north displacement on the grid.
    pub fn apply_displacement(&self, point: &GeoPoint, d_east: f64, d_north: f64) -> GeoPoint {
        let grid = self.to_grid(point);
        self.from_grid(&GridPoint {
            easting: grid.easting + d_east,
            northing: grid.northing + d_north,
        })
    }
}

fn is_in_great_britain(latitude: f64, longitude: f64) -> bool {
    (49.0..=61.0).contains(&latitude) && (-10.0..=2.0).contains(&longitude)
}

/// Standard 6° UTM zone numbering, 1..=60.
pub fn utm_zone(longitude: f64) -> u8 {
    let zone = ((longitude + 180.0) / 6.0).floor() as i64 + 1;
    zone.clamp(1, 60) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn london_uses_national_grid() {
        let proj = GridProjection::for_location(51.5074, -0.1278).unwrap();
        assert_eq!(proj.kind(), GridKind::BritishNationalGrid);

        let grid = proj.to_grid(&GeoPoint::new(51.5074, -0.1278));
        assert_abs_diff_eq!(grid.easting, 530_028.747, epsilon = 1.0);
        assert_abs_diff_eq!(grid.northing, 180_380.094, epsilon = 1.0);

        let moved = proj.apply_displacement(&GeoPoint::new(51.5074, -0.1278), 1.0, 1.0);
        assert_abs_diff_eq!(moved.latitude, 51.507409, epsilon = 1e-4);
        assert_abs_diff_eq!(moved.longitude, -0.127785, epsilon = 1e-4);
    }

    #[test]
    fn new_york_uses_utm_18n() {
        let proj = GridProjection::for_location(40.775602, -73.970561).unwrap();
        assert_eq!(
            proj.kind(),
            GridKind::Utm {
                zone: 18,
                north: true
            }
        );
        let grid = proj.to_grid(&GeoPoint::new(40.775602, -73.970561));
        assert_abs_diff_eq!(grid.easting, 586_871.055, epsilon = 1.0);
        assert_abs_diff_eq!(grid.northing, 4_514_356.956, epsilon = 1.0);
    }

    #[test]
    fn southern_hemisphere_uses_false_northing() {
        let proj = GridProjection::for_location(-26.313113, 134.23096).unwrap();
        assert_eq!(
            proj.kind(),
            GridKind::Utm {
                zone: 53,
                north: false
            }
        );
        let grid = proj.to_grid(&GeoPoint::new(-26.313113, 134.23096));
        assert_abs_diff_eq!(grid.easting, 423_240.035, epsilon = 1.0);
        assert_abs_diff_eq!(grid.northing, 7_089_411.762, epsilon = 1.0);

        let moved = proj.apply_displacement(&GeoPoint::new(-26.313113, 134.23096), 1.0, 1.0);
        assert_abs_diff_eq!(moved.latitude, -26.313104, epsilon = 1e-4);
        assert_abs_diff_eq!(moved.longitude, 134.230970, epsilon = 1e-4);
    }

    #[test]
    fn grid_round_trip() {
        let points = [
            GeoPoint::new(55.9227, -3.1746),
            GeoPoint::new(40.775602, -73.970561),
            GeoPoint::new(-33.8688, 151.2093),
        ];
        for p in points {
            let proj = GridProjection::for_location(p.latitude, p.longitude).unwrap();
            let back = proj.from_grid(&proj.to_grid(&p));
            assert_abs_diff_eq!(back.latitude, p.latitude, epsilon = 1e-7);
            assert_abs_diff_eq!(back.longitude, p.longitude, epsilon = 1e-7);
        }
    }

    #[test]
    fn utm_zone_edges() {
        assert_eq!(utm_zone(-180.0), 1);
        assert_eq!(utm_zone(-73.97), 18);
        assert_eq!(utm_zone(179.9), 60);
        assert_eq!(utm_zone(180.0), 60);
    }

    #[test]
    fn null_fix_has_no_grid() {
        assert!(GridProjection::for_location(0.0, 0.0).is_err());
    }
}
