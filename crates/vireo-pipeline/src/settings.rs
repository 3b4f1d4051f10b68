//! Codec settings contracts.
//!
//! A settings provider pushes native codec options as key/value pairs at
//! build time. Providers that can retune a live target additionally expose
//! the [`AdaptiveRate`] capability, which is what adaptive rebuilds key off.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::PipelineResult;

/// Source of native codec options.
pub trait CodecSettings: Send + Sync {
    /// Visit every option as `(key, value)`. The visitor's error aborts the
    /// iteration and is returned as-is.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    fn for_each(
        &self,
        f: &mut dyn FnMut(&str, &str) -> PipelineResult<()>,
    ) -> PipelineResult<()>;

    /// Probe the optional live-adaptation capability.
    fn as_adaptive(&self) -> Option<&dyn AdaptiveRate> {
        None
    }
}

/// Settings that support retargeting between builds.
pub trait AdaptiveRate: Send + Sync {
    /// Record a new target for subsequent builds.
    ///
    /// # Errors
    ///
    /// Returns an error when the value cannot be applied.
    fn adapt_rate(&self, value: u64) -> PipelineResult<()>;

    /// The currently recorded target.
    ///
    /// # Errors
    ///
    /// Returns an error when no target is known.
    fn current_rate(&self) -> PipelineResult<u64>;
}

/// Bitrate-keyed encoder settings.
///
/// Emits the standard rate-control option triple; the buffer window is twice
/// the per-second budget.
#[derive(Debug)]
pub struct BitrateSettings {
    target_bps: AtomicU64,
}

impl BitrateSettings {
    #[must_use]
    pub fn new(initial_bps: u64) -> Self {
        Self {
            target_bps: AtomicU64::new(initial_bps),
        }
    }

    #[must_use]
    pub fn target_bps(&self) -> u64 {
        self.target_bps.load(Ordering::Acquire)
    }
}

impl CodecSettings for BitrateSettings {
    fn for_each(
        &self,
        f: &mut dyn FnMut(&str, &str) -> PipelineResult<()>,
    ) -> PipelineResult<()> {
        let bps = self.target_bps();
        f("b", &bps.to_string())?;
        f("maxrate", &bps.to_string())?;
        f("bufsize", &(bps * 2).to_string())?;
        Ok(())
    }

    fn as_adaptive(&self) -> Option<&dyn AdaptiveRate> {
        Some(self)
    }
}

impl AdaptiveRate for BitrateSettings {
    fn adapt_rate(&self, value: u64) -> PipelineResult<()> {
        self.target_bps.store(value, Ordering::Release);
        Ok(())
    }

    fn current_rate(&self) -> PipelineResult<u64> {
        Ok(self.target_bps())
    }
}

/// Frame-rate-keyed filter settings.
#[derive(Debug)]
pub struct FrameRateSettings {
    fps: AtomicU64,
}

impl FrameRateSettings {
    #[must_use]
    pub fn new(initial_fps: u64) -> Self {
        Self {
            fps: AtomicU64::new(initial_fps),
        }
    }

    #[must_use]
    pub fn fps(&self) -> u64 {
        self.fps.load(Ordering::Acquire)
    }
}

impl CodecSettings for FrameRateSettings {
    fn for_each(
        &self,
        f: &mut dyn FnMut(&str, &str) -> PipelineResult<()>,
    ) -> PipelineResult<()> {
        f("fps", &self.fps().to_string())
    }

    fn as_adaptive(&self) -> Option<&dyn AdaptiveRate> {
        Some(self)
    }
}

impl AdaptiveRate for FrameRateSettings {
    fn adapt_rate(&self, value: u64) -> PipelineResult<()> {
        self.fps.store(value, Ordering::Release);
        Ok(())
    }

    fn current_rate(&self) -> PipelineResult<u64> {
        Ok(self.fps())
    }
}
