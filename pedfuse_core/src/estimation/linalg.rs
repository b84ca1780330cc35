// pedfuse_core/src/estimation/linalg.rs

//! Small fixed-size helpers shared by the Kalman variants. Every matrix here
//! is 2x2, so shapes are checked by the type system.

use nalgebra::{Matrix2, Vector2};
use tracing::warn;

use crate::error::FilterError;

/// Below this `|det|` a 2x2 matrix is considered singular.
pub const SINGULAR_DETERMINANT: f64 = 1e-10;
/// Added to the diagonal of a near-singular matrix before retrying.
pub const REGULARIZATION: f64 = 1e-8;

/// Closed-form inverse of a 2x2 matrix. A near-singular input is regularized
/// once; if it is still singular the inversion fails.
pub fn invert_2x2(m: &Matrix2<f64>) -> Result<Matrix2<f64>, FilterError> {
    let mut m = *m;
    let mut det = m.determinant();
    if det.abs() < SINGULAR_DETERMINANT || !det.is_finite() {
        warn!(det, "matrix is nearly singular, adding regularization term");
        m[(0, 0)] += REGULARIZATION;
        m[(1, 1)] += REGULARIZATION;
        det = m.determinant();
        if det.abs() < SINGULAR_DETERMINANT || !det.is_finite() {
            return Err(FilterError::NumericalDegeneracy(format!(
                "matrix is not invertible, determinant {det:e}"
            )));
        }
    }
    let inv_det = 1.0 / det;
    Ok(Matrix2::new(
        m[(1, 1)] * inv_det,
        -m[(0, 1)] * inv_det,
        -m[(1, 0)] * inv_det,
        m[(0, 0)] * inv_det,
    ))
}

/// Inverse when it exists, Moore-Penrose pseudo-inverse otherwise.
pub fn inverse_or_pseudo(m: &Matrix2<f64>) -> Result<Matrix2<f64>, FilterError> {
    if m.determinant().abs() >= SINGULAR_DETERMINANT {
        if let Some(inv) = m.try_inverse() {
            return Ok(inv);
        }
    }
    m.pseudo_inverse(1e-12)
        .map_err(|e| FilterError::NumericalDegeneracy(e.to_string()))
}

/// Counter-clockwise rotation by `theta` radians.
pub fn rotation(theta: f64) -> Matrix2<f64> {
    let (s, c) = theta.sin_cos();
    Matrix2::new(c, -s, s, c)
}

/// `R(-θ) · cov · R(-θ)ᵀ`, with `θ = atan2(vx, vy)` the heading measured
/// clockwise from north. The north axis of `cov` ends up on the direction of
/// travel `(sin θ, cos θ)`; walking due north leaves `cov` unrotated.
pub fn heading_aligned(cov: &Matrix2<f64>, velocity: &Vector2<f64>) -> Matrix2<f64> {
    let theta = velocity.x.atan2(velocity.y);
    let r = rotation(-theta);
    r * cov * r.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn inverse_matches_nalgebra() {
        let m = Matrix2::new(4.0, 1.0, 2.0, 3.0);
        let inv = invert_2x2(&m).unwrap();
        let expected = m.try_inverse().unwrap();
        for (a, b) in inv.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn zero_matrix_is_regularized() {
        let inv = invert_2x2(&Matrix2::zeros());
        // 1e-8 on the diagonal gives det 1e-16, still below the threshold.
        assert!(matches!(inv, Err(FilterError::NumericalDegeneracy(_))));
    }

    #[test]
    fn near_singular_recovers_with_regularization() {
        // det = 1e-11 before, ~1e-8 after regularization
        let m = Matrix2::new(1.0, 0.0, 0.0, 1e-11);
        let inv = invert_2x2(&m).unwrap();
        assert!(inv.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn pseudo_inverse_of_singular() {
        let m = Matrix2::new(1.0, 0.0, 0.0, 0.0);
        let p = inverse_or_pseudo(&m).unwrap();
        assert_abs_diff_eq!(p[(0, 0)], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p[(1, 1)], 0.0, epsilon = 1e-9);
    }

    fn major_axis(m: &Matrix2<f64>) -> Vector2<f64> {
        let eigen = m.symmetric_eigen();
        let i = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] { 0 } else { 1 };
        eigen.eigenvectors.column(i).into_owned()
    }

    #[test]
    fn heading_aligned_major_axis_follows_travel() {
        // Along-track variance on the north axis.
        let cov = Matrix2::new(0.1, 0.0, 0.0, 2.0);
        for heading_deg in [0.0_f64, 45.0, 90.0, 135.0, 200.0, 300.0] {
            let h = heading_deg.to_radians();
            let travel = Vector2::new(h.sin(), h.cos());
            let q = heading_aligned(&cov, &(travel * 1.4));
            let axis = major_axis(&q);
            assert_abs_diff_eq!(axis.dot(&travel).abs(), 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(q.trace(), cov.trace(), epsilon = 1e-12);
        }
        // North-east travel correlates the axes positively.
        let q = heading_aligned(&cov, &Vector2::new(1.0, 1.0));
        assert_abs_diff_eq!(q[(0, 1)], 0.95, epsilon = 1e-12);
    }

    #[test]
    fn heading_aligned_preserves_trace() {
        let cov = Matrix2::new(2.0, 0.0, 0.0, 0.1);
        let q = heading_aligned(&cov, &Vector2::new(1.0, 1.0));
        assert_abs_diff_eq!(q.trace(), cov.trace(), epsilon = 1e-12);
        assert_abs_diff_eq!(q[(0, 1)], q[(1, 0)], epsilon = 1e-12);
        // Walking due north keeps the ellipse as configured.
        let north = heading_aligned(&cov, &Vector2::new(0.0, 1.0));
        assert_abs_diff_eq!(north[(0, 0)], 2.0, epsilon = 1e-12);
    }
}
