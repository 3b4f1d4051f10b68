#![forbid(unsafe_code)]

//! Pull-based media pipeline stages with hot-swap reconfiguration.
//!
//! Every processing stage (demux, decode, filter, encode) exposes the same
//! [`Stage`] interface: a blocking pull, a return-for-reuse, and idempotent
//! start/close. That uniformity is what makes hot-swap possible: an
//! [`AdaptiveStage`] wraps any stage and, on an adaptation request, builds a
//! replacement instance through a [`StageBuilder`], atomically redirects
//! future reads to it, and retires the old instance only after the swap is
//! visible. In-flight consumption sees at most a brief stall, never an
//! interruption.
//!
//! Codec bit-level work stays behind the opaque [`MediaProcessor`] contract;
//! this crate owns only the lifecycle, buffering, and swap coordination
//! around it.

mod builder;
mod error;
mod hotswap;
mod pool;
mod process;
mod settings;
mod stage;
pub mod testing;

pub use builder::{ProcessStageBuilder, ProcessorFactory, StageBuilder};
pub use error::{BoxError, PipelineError, PipelineResult};
pub use hotswap::{AdaptiveStage, UpdateConfig};
pub use pool::{Pool, Reuse};
pub use process::{MediaProcessor, ProcessStage};
pub use settings::{AdaptiveRate, BitrateSettings, CodecSettings, FrameRateSettings};
pub use stage::{RateReporter, Stage};
