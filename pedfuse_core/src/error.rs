// pedfuse_core/src/error.rs

use thiserror::Error;

/// Every way a filter operation can refuse to commit.
///
/// A failed `predict` or `update` never mutates the filter: the caller
/// should treat it as "no new information this cycle" and keep using the
/// last estimate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// Malformed or out-of-range input: NaN or (0, 0) coordinates, invalid
    /// covariance, non-positive noise, non-increasing timestamps.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The innovation covariance stayed singular after regularization.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// Mismatched matrix dimensions or an inconsistent configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FilterError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        FilterError::InvalidInput(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        FilterError::Configuration(msg.into())
    }
}
