// pedfuse_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::error::FilterError;
pub use crate::estimation::{Estimator, FilterKind, PositionFilter};
pub use crate::messages::{
    ControlInput, Estimate, FusionInput, Observation, PdrSample, SensorSource,
};

// --- Core Data Structures ---
pub use crate::frames::projection::{GridPoint, GridProjection};
pub use crate::frames::ReferenceFrame;
pub use crate::types::{Covariance, GeoPoint, LocalPoint, Position};

// --- Configuration & Pipeline ---
pub use crate::config::{EkfConfig, FilterConfig, KalmanConfig, ParticleConfig};
pub use crate::session::{FusionSession, SessionStats};

// --- Concrete Estimators (Export common ones for convenience) ---
pub use crate::estimation::filters::ekf::ExtendedKalmanEstimator;
pub use crate::estimation::filters::kalman::{LinearKalmanEstimator, LinearModel};
pub use crate::estimation::filters::particle::{Particle, ParticleEstimator};
pub use crate::smoothing::{
    low_pass, weighted_moving_average, ExponentialSmoother, Planar, TrajectorySmoother,
};
