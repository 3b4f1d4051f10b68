//! Sinks that turn distributed bandwidth shares into stage reconfigurations.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vireo_bandwidth::{BitrateSink, SinkError};
use vireo_pipeline::{AdaptiveStage, StageBuilder};

/// Feeds each distributed share straight into an [`AdaptiveStage`] as its new
/// bitrate target.
///
/// An adaptation failure propagates to the controller, which drops this
/// subscriber; a closed or broken stage should stop receiving shares.
pub struct AdaptiveBitrateSink<B: StageBuilder> {
    stage: Arc<AdaptiveStage<B>>,
}

impl<B: StageBuilder> AdaptiveBitrateSink<B> {
    #[must_use]
    pub fn new(stage: Arc<AdaptiveStage<B>>) -> Self {
        Self { stage }
    }
}

#[async_trait]
impl<B: StageBuilder> BitrateSink for AdaptiveBitrateSink<B> {
    async fn update_bitrate(&self, bps: u64) -> Result<(), SinkError> {
        self.stage.adapt(bps)?;
        Ok(())
    }
}

/// Two-point frame-rate policy for [`FrameRateSink`].
#[derive(Debug, Clone, Copy)]
pub struct FrameRateSwitch {
    /// Shares strictly below this many bits per second map to `low_fps`.
    pub switch_limit_bps: u64,
    pub low_fps: u64,
    pub high_fps: u64,
}

/// Translates a bitrate share into a frame-rate target for a filter stage.
///
/// Frame rate is the lever for consumers whose encoder is not directly
/// retunable: starve them of bandwidth and they shed frames instead of bits.
pub struct FrameRateSink<B: StageBuilder> {
    stage: Arc<AdaptiveStage<B>>,
    switch: FrameRateSwitch,
}

impl<B: StageBuilder> FrameRateSink<B> {
    #[must_use]
    pub fn new(stage: Arc<AdaptiveStage<B>>, switch: FrameRateSwitch) -> Self {
        Self { stage, switch }
    }
}

#[async_trait]
impl<B: StageBuilder> BitrateSink for FrameRateSink<B> {
    async fn update_bitrate(&self, bps: u64) -> Result<(), SinkError> {
        let fps = if bps < self.switch.switch_limit_bps {
            self.switch.low_fps
        } else {
            self.switch.high_fps
        };
        debug!(bps, fps, "mapping bandwidth share to frame rate");
        self.stage.adapt(fps)?;
        Ok(())
    }
}
