//! Scripted test doubles for stages, processors, and builders.
//!
//! Used by this crate's own tests and by downstream crates that need a
//! controllable stage without native codec state.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    builder::StageBuilder,
    error::{PipelineError, PipelineResult},
    pool::Pool,
    process::{MediaProcessor, ProcessStage},
    settings::{BitrateSettings, CodecSettings},
};

/// One scripted step of a [`ScriptedProcessor`].
enum Step {
    Chunk(Vec<u8>),
    Fail(String),
}

/// Processor that replays a fixed script of chunks and failures.
///
/// After the script is exhausted it either reports end of stream or, with
/// [`hold_open`](ScriptedProcessor::hold_open), parks forever, for tests that
/// need a stage that stays alive until explicitly closed.
pub struct ScriptedProcessor {
    script: VecDeque<Step>,
    hold_open: bool,
    releases: Arc<AtomicUsize>,
}

impl ScriptedProcessor {
    #[must_use]
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            script: chunks.into_iter().map(Step::Chunk).collect(),
            hold_open: false,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Park instead of reporting end of stream when the script runs out.
    #[must_use]
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Queue a failure after the chunks queued so far.
    #[must_use]
    pub fn then_fail(mut self, message: &str) -> Self {
        self.script.push_back(Step::Fail(message.to_owned()));
        self
    }

    /// Shared counter of [`MediaProcessor::release`] calls.
    #[must_use]
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }
}

#[async_trait]
impl MediaProcessor for ScriptedProcessor {
    type Item = Vec<u8>;

    async fn process_next(&mut self, out: &mut Vec<u8>) -> PipelineResult<bool> {
        match self.script.pop_front() {
            Some(Step::Chunk(chunk)) => {
                out.extend_from_slice(&chunk);
                Ok(true)
            }
            Some(Step::Fail(message)) => Err(PipelineError::Processor(message.into())),
            None if self.hold_open => std::future::pending().await,
            None => Ok(false),
        }
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::AcqRel);
    }
}

/// Settings provider without the [`AdaptiveRate`](crate::AdaptiveRate)
/// capability, for exercising `InterfaceMismatch` paths.
pub struct PlainSettings;

impl CodecSettings for PlainSettings {
    fn for_each(
        &self,
        _f: &mut dyn FnMut(&str, &str) -> PipelineResult<()>,
    ) -> PipelineResult<()> {
        Ok(())
    }
}

/// Builder producing numbered [`ScriptedProcessor`] stages.
///
/// Each build yields a stage whose items are labeled `b<build>-c<chunk>`, so
/// a test can observe which instance served a read. Build failures can be
/// armed one call ahead, and every instance's release counter is retained
/// for close-exactly-once assertions.
pub struct ScriptedStageBuilder {
    settings: Arc<BitrateSettings>,
    pool: Arc<Pool<Vec<u8>>>,
    chunks_per_build: usize,
    builds: AtomicUsize,
    fail_next: AtomicBool,
    release_counters: Mutex<Vec<Arc<AtomicUsize>>>,
}

impl ScriptedStageBuilder {
    #[must_use]
    pub fn new(initial_bps: u64, chunks_per_build: usize) -> Self {
        Self {
            settings: Arc::new(BitrateSettings::new(initial_bps)),
            pool: Arc::new(Pool::new(16, 4096)),
            chunks_per_build,
            builds: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            release_counters: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `build` call fail.
    pub fn fail_next_build(&self) {
        self.fail_next.store(true, Ordering::Release);
    }

    /// Number of successful builds so far.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Acquire)
    }

    /// Release-call count for the `n`th built stage (zero-based).
    #[must_use]
    pub fn release_count(&self, n: usize) -> usize {
        self.release_counters.lock()[n].load(Ordering::Acquire)
    }
}

impl StageBuilder for ScriptedStageBuilder {
    type Stage = ProcessStage<ScriptedProcessor>;

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
        if self.fail_next.swap(false, Ordering::AcqRel) {
            return Err(PipelineError::Build("scripted build failure".into()));
        }

        let n = self.builds.fetch_add(1, Ordering::AcqRel) + 1;
        let chunks =
            (0..self.chunks_per_build).map(|i| format!("b{n}-c{i}").into_bytes());
        let processor = ScriptedProcessor::new(chunks).hold_open();
        self.release_counters
            .lock()
            .push(processor.release_counter());

        Ok(ProcessStage::with_settings(
            processor,
            8,
            Arc::clone(&self.pool),
            Arc::clone(&self.settings) as Arc<dyn CodecSettings>,
        ))
    }
}
