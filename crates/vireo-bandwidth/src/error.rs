//! Error types for bandwidth distribution.

use thiserror::Error;

use crate::controller::ControllerState;

/// Errors that can occur while managing subscribers or running the
/// distribution loop.
#[derive(Debug, Error)]
pub enum BandwidthError {
    #[error("subscriber already exists: {0}")]
    AlreadyExists(String),

    #[error("no bandwidth estimate available")]
    EstimatorUnavailable,

    #[error("controller cannot start from state {0:?}")]
    InvalidState(ControllerState),
}

/// Result type for bandwidth operations.
pub type BandwidthResult<T> = Result<T, BandwidthError>;
