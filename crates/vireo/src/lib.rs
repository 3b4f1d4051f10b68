#![forbid(unsafe_code)]

//! # Vireo
//!
//! Facade crate tying bandwidth distribution to pipeline reconfiguration.
//!
//! A [`bandwidth::BandwidthController`] periodically splits one bandwidth
//! estimate across prioritized consumers; the sinks in this crate turn each
//! consumer's share into a live reconfiguration of a
//! [`pipeline::AdaptiveStage`].
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vireo::prelude::*;
//!
//! let controller = Arc::new(BandwidthController::new(ControllerOptions::default()));
//! controller.attach_estimator(estimate);
//!
//! let video = Arc::new(AdaptiveStage::new(video_config, video_builder)?);
//! controller.subscribe(
//!     "video",
//!     Priority::LEVEL3,
//!     Arc::new(AdaptiveBitrateSink::new(Arc::clone(&video))),
//! )?;
//! controller.start()?;
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod bandwidth {
    pub use vireo_bandwidth::*;
}

pub mod pipeline {
    pub use vireo_pipeline::*;
}

// ── Distribution sinks ──────────────────────────────────────────────────

mod sink;

pub use sink::{AdaptiveBitrateSink, FrameRateSink, FrameRateSwitch};

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use vireo_bandwidth::{
        BandwidthController, BandwidthEstimator, BitrateSink, ControllerOptions, Priority,
        SharedEstimate,
    };
    pub use vireo_pipeline::{
        AdaptiveStage, CodecSettings, MediaProcessor, PipelineError, PipelineResult, Stage,
        StageBuilder, UpdateConfig,
    };

    pub use crate::{AdaptiveBitrateSink, FrameRateSink, FrameRateSwitch};
}
