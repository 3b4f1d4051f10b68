//! Error types for pipeline stages.

use thiserror::Error;

/// Opaque failure from a native codec/filter context.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while pulling from, reconfiguring, or querying a
/// pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No stage is installed yet and the ready-wait deadline expired.
    #[error("stage not ready")]
    NotReady,

    /// The stage has been closed; no further items will be produced.
    #[error("stage closed")]
    Closed,

    /// An optional capability (adapt rate, report current rate) was invoked
    /// against a stage that does not implement it. Not fatal: treat the
    /// capability as unsupported.
    #[error("stage does not implement the requested capability")]
    InterfaceMismatch,

    #[error("invalid update config: {0}")]
    InvalidConfig(String),

    /// Stage construction failed. The previously serving stage, if any,
    /// remains authoritative.
    #[error("stage construction failed: {0}")]
    Build(#[source] BoxError),

    /// The opaque processor reported a failure for the current item.
    #[error("processor error: {0}")]
    Processor(#[source] BoxError),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
