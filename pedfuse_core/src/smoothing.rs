// pedfuse_core/src/smoothing.rs

//! Output conditioning for fused trajectories: a linearly weighted moving
//! average, a one-shot low-pass blend and their streaming counterparts.

use std::collections::VecDeque;

use crate::error::FilterError;
use crate::types::{GeoPoint, LocalPoint};

/// A 2-D point that can be averaged component-wise.
pub trait Planar: Copy {
    fn components(&self) -> (f64, f64);
    fn from_components(a: f64, b: f64) -> Self;
}

impl Planar for GeoPoint {
    fn components(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    fn from_components(a: f64, b: f64) -> Self {
        GeoPoint::new(a, b)
    }
}

impl Planar for LocalPoint {
    fn components(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    fn from_components(a: f64, b: f64) -> Self {
        LocalPoint::new(a, b)
    }
}

/// Linearly weighted moving average ending at `points[target]`.
///
/// The most recent point gets weight `window`, the one before `window - 1`,
/// down to 1. With fewer than `window` points of history the raw sample is
/// returned. `None` when `window` is 0 or `target` is out of bounds.
pub fn weighted_moving_average<P: Planar>(points: &[P], window: usize, target: usize) -> Option<P> {
    if window == 0 || target >= points.len() {
        return None;
    }
    if target + 1 < window {
        return Some(points[target]);
    }
    let (mut a, mut b, mut total) = (0.0, 0.0, 0.0);
    for (age, point) in points[target + 1 - window..=target].iter().rev().enumerate() {
        let weight = (window - age) as f64;
        let (pa, pb) = point.components();
        a += pa * weight;
        b += pb * weight;
        total += weight;
    }
    Some(P::from_components(a / total, b / total))
}

/// `previous·(1 − α) + current·α`.
///
/// `alpha` is clamped to [0, 1], NaN counts as 0. When only one point is
/// present it is returned unchanged.
pub fn low_pass<P: Planar>(previous: Option<P>, current: Option<P>, alpha: f64) -> Option<P> {
    let alpha = if alpha.is_nan() { 0.0 } else { alpha.clamp(0.0, 1.0) };
    match (previous, current) {
        (Some(prev), Some(cur)) => {
            let (pa, pb) = prev.components();
            let (ca, cb) = cur.components();
            Some(P::from_components(
                pa * (1.0 - alpha) + ca * alpha,
                pb * (1.0 - alpha) + cb * alpha,
            ))
        }
        (Some(p), None) | (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

// =========================================================================
// == Streaming Smoothers ==
// =========================================================================

/// Stateful exponential smoothing of a point stream.
#[derive(Debug, Clone)]
pub struct ExponentialSmoother<P> {
    alpha: f64,
    current: Option<P>,
}

impl<P: Planar> ExponentialSmoother<P> {
    /// `alpha` must lie in (0, 1]; 1 passes samples through untouched.
    pub fn new(alpha: f64) -> Result<Self, FilterError> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(FilterError::config(format!(
                "smoothing factor must be in (0, 1], got {alpha}"
            )));
        }
        Ok(Self {
            alpha,
            current: None,
        })
    }

    pub fn smooth(&mut self, sample: P) -> P {
        let next = low_pass(self.current, Some(sample), self.alpha).unwrap_or(sample);
        self.current = Some(next);
        next
    }

    pub fn current(&self) -> Option<P> {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// A fixed window over the most recent points, smoothed with
/// [`weighted_moving_average`] as each one arrives.
#[derive(Debug, Clone)]
pub struct TrajectorySmoother<P> {
    window: usize,
    buffer: VecDeque<P>,
}

impl<P: Planar> TrajectorySmoother<P> {
    pub fn new(window: usize) -> Result<Self, FilterError> {
        if window == 0 {
            return Err(FilterError::config("smoothing window must be at least 1"));
        }
        Ok(Self {
            window,
            buffer: VecDeque::with_capacity(window),
        })
    }

    /// Adds a point and returns its smoothed value.
    pub fn push(&mut self, point: P) -> P {
        if self.buffer.len() == self.window {
            self.buffer.pop_front();
        }
        self.buffer.push_back(point);
        let points = self.buffer.make_contiguous();
        weighted_moving_average(points, self.window, points.len() - 1).unwrap_or(point)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
