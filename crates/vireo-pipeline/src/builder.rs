//! Stage construction.
//!
//! A [`StageBuilder`] is the recipe a hot-swap wrapper replays on every
//! adaptation: it remembers the current target, reconfigures its settings,
//! and produces a fresh stage instance on demand.

use std::sync::Arc;

use crate::{
    error::{PipelineError, PipelineResult},
    pool::Pool,
    process::{MediaProcessor, ProcessStage},
    settings::CodecSettings,
};

/// Rebuildable recipe for one stage.
///
/// Builders are shared behind `Arc` between the wrapper and whoever feeds it
/// targets, so every method takes `&self`.
pub trait StageBuilder: Send + Sync + 'static {
    /// The concrete stage this builder produces.
    type Stage: crate::Stage;

    /// Record a new target (bits per second, frames per second) for
    /// subsequent builds.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InterfaceMismatch`] when the builder's
    /// settings cannot adapt.
    fn set_target(&self, target: u64) -> PipelineResult<()>;

    /// The target the next build would use.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InterfaceMismatch`] when the builder's
    /// settings cannot report a target.
    fn current_target(&self) -> PipelineResult<u64>;

    /// Construct a fresh, not-yet-started stage at the current target.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Build`] when native setup fails; the caller
    /// keeps whatever stage it was already serving.
    fn build(&self) -> PipelineResult<Self::Stage>;
}

/// Produces the processor for one [`ProcessStageBuilder`] build, after the
/// settings have been retargeted.
pub trait ProcessorFactory: Send + Sync + 'static {
    type Processor: MediaProcessor;

    /// Open native contexts against the given settings.
    ///
    /// # Errors
    ///
    /// Any native setup failure, surfaced to the caller as
    /// [`PipelineError::Build`] by the owning builder.
    fn open(&self, settings: &dyn CodecSettings) -> PipelineResult<Self::Processor>;
}

impl<P, F> ProcessorFactory for F
where
    P: MediaProcessor,
    F: Fn(&dyn CodecSettings) -> PipelineResult<P> + Send + Sync + 'static,
{
    type Processor = P;

    fn open(&self, settings: &dyn CodecSettings) -> PipelineResult<Self::Processor> {
        self(settings)
    }
}

/// [`StageBuilder`] that pairs a settings provider with a processor factory.
///
/// All builds share one reuse pool, so items recycled from a replaced stage
/// keep serving its successor.
pub struct ProcessStageBuilder<F: ProcessorFactory> {
    settings: Arc<dyn CodecSettings>,
    factory: F,
    capacity: usize,
    pool: Arc<Pool<<F::Processor as MediaProcessor>::Item>>,
}

impl<F: ProcessorFactory> ProcessStageBuilder<F> {
    #[must_use]
    pub fn new(settings: Arc<dyn CodecSettings>, factory: F, capacity: usize) -> Self {
        Self {
            settings,
            factory,
            capacity,
            pool: Arc::new(Pool::new(capacity * 2, 4096)),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<dyn CodecSettings> {
        &self.settings
    }
}

impl<F: ProcessorFactory> StageBuilder for ProcessStageBuilder<F> {
    type Stage = ProcessStage<F::Processor>;

    fn set_target(&self, target: u64) -> PipelineResult<()> {
        self.settings
            .as_adaptive()
            .ok_or(PipelineError::InterfaceMismatch)?
            .adapt_rate(target)
    }

    fn current_target(&self) -> PipelineResult<u64> {
        self.settings
            .as_adaptive()
            .ok_or(PipelineError::InterfaceMismatch)?
            .current_rate()
    }

    fn build(&self) -> PipelineResult<Self::Stage> {
        let processor = self.factory.open(self.settings.as_ref())?;
        Ok(ProcessStage::with_settings(
            processor,
            self.capacity,
            Arc::clone(&self.pool),
            Arc::clone(&self.settings),
        ))
    }
}
