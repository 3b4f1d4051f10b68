//! Bandwidth estimate sampling.
//!
//! Estimation itself lives in an external congestion controller; this module
//! only defines the sampling contract plus a [`SharedEstimate`] handle the
//! external component can publish into.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[cfg(test)]
use mockall::automock;

use crate::error::{BandwidthError, BandwidthResult};

/// Read-only view of an externally-refreshed bandwidth estimate.
///
/// The value is a best-effort snapshot in bits per second; it may be stale.
/// A failing read is an expected steady-state condition (the controller skips
/// the tick), never a fault.
#[cfg_attr(test, automock)]
pub trait BandwidthEstimator: Send + Sync {
    /// Current target bitrate in bits per second.
    ///
    /// # Errors
    ///
    /// Returns [`BandwidthError::EstimatorUnavailable`] when no estimate can
    /// be produced right now.
    fn target_bitrate(&self) -> BandwidthResult<u64>;

    /// Release the estimator. Subsequent reads fail.
    fn close(&self);
}

/// Lock-free estimate cell for wiring an external congestion controller.
///
/// The producer side calls [`publish`](SharedEstimate::publish) whenever a new
/// estimate arrives; the distribution loop samples it through the
/// [`BandwidthEstimator`] impl. Reads before the first publish report
/// unavailable.
#[derive(Debug, Default)]
pub struct SharedEstimate {
    bps: AtomicU64,
    available: AtomicBool,
    closed: AtomicBool,
}

impl SharedEstimate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a fresh estimate in bits per second.
    pub fn publish(&self, bps: u64) {
        self.bps.store(bps, Ordering::Release);
        self.available.store(true, Ordering::Release);
    }

    /// Drop the current estimate; reads fail until the next publish.
    pub fn invalidate(&self) {
        self.available.store(false, Ordering::Release);
    }
}

impl BandwidthEstimator for SharedEstimate {
    fn target_bitrate(&self) -> BandwidthResult<u64> {
        if self.closed.load(Ordering::Acquire) || !self.available.load(Ordering::Acquire) {
            return Err(BandwidthError::EstimatorUnavailable);
        }
        Ok(self.bps.load(Ordering::Acquire))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
