//! The uniform stage interface.

use async_trait::async_trait;

use crate::error::PipelineResult;

/// Reports a stage's currently applied rate (bits per second for encoders,
/// frames per second for filters). An optional capability; probe through
/// [`Stage::as_rate_reporter`].
pub trait RateReporter: Send + Sync {
    /// The rate the stage is currently configured for.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InterfaceMismatch`] when the underlying
    /// settings cannot report a rate.
    ///
    /// [`PipelineError::InterfaceMismatch`]: crate::PipelineError::InterfaceMismatch
    fn current_rate(&self) -> PipelineResult<u64>;
}

/// One unit in a pull-based processing chain.
///
/// A stage is single-owner: exactly one wrapper (or the pipeline itself)
/// holds the authoritative reference at any instant. Callers interact only
/// through this interface, which is what lets a hot-swap wrapper substitute
/// one concrete instance for another without its consumers noticing.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// The unit this stage produces (packet, frame, sample block).
    type Item: Send + 'static;

    /// Pull the next item, waiting until one is available.
    ///
    /// Cancel-safe: callers bound the wait with their own deadline
    /// (`tokio::time::timeout`) or by dropping the future.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Closed`] once the stage is closed and its
    /// buffered output is drained; waiters blocked in `get` are unblocked
    /// with the same error rather than hanging.
    ///
    /// [`PipelineError::Closed`]: crate::PipelineError::Closed
    async fn get(&self) -> PipelineResult<Self::Item>;

    /// Return a consumed item to the stage's reuse pool.
    ///
    /// Must be safe to call at any point in the stage's lifecycle, including
    /// after close: a late return is silently absorbed.
    fn put_back(&self, item: Self::Item);

    /// Begin the stage's internal pull/push loop. Idempotent.
    fn start(&self);

    /// Stop the loop, release native resources, and unblock waiters.
    /// Idempotent; resources are released exactly once.
    fn close(&self);

    /// Probe the optional rate-reporting capability.
    fn as_rate_reporter(&self) -> Option<&dyn RateReporter> {
        None
    }
}
