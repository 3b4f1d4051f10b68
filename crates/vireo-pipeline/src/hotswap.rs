//! Hot-swappable stage wrapper.
//!
//! [`AdaptiveStage`] holds the authoritative reference to one live stage and
//! rebuilds it through its [`StageBuilder`] when the target rate moves far
//! enough. Consumers read through the wrapper's own [`Stage`] surface and
//! never observe the substitution.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::{
    builder::StageBuilder,
    error::{PipelineError, PipelineResult},
    stage::{RateReporter, Stage},
};

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Adaptation bounds for an [`AdaptiveStage`].
#[derive(Debug, Clone, Copy)]
pub struct UpdateConfig {
    min_target: u64,
    max_target: u64,
    min_change_pct: u64,
    ready_timeout: Duration,
}

impl UpdateConfig {
    /// Targets are clamped to `[min_target, max_target]`; changes smaller
    /// than `min_change_pct` percent of the applied rate are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when `min_target` exceeds
    /// `max_target`.
    pub fn new(min_target: u64, max_target: u64, min_change_pct: u64) -> PipelineResult<Self> {
        if min_target > max_target {
            return Err(PipelineError::InvalidConfig(format!(
                "min_target {min_target} exceeds max_target {max_target}"
            )));
        }
        Ok(Self {
            min_target,
            max_target,
            min_change_pct,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        })
    }

    /// How long readers of a deferred wrapper wait for the first build.
    #[must_use]
    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }
}

/// A [`Stage`] whose concrete instance is rebuilt on demand.
pub struct AdaptiveStage<B: StageBuilder> {
    builder: B,
    config: UpdateConfig,
    slot: RwLock<Option<Arc<B::Stage>>>,
    installed: Notify,
    // Serializes adapt and close; readers never take it.
    swap_gate: Mutex<()>,
    closed: AtomicBool,
}

impl<B: StageBuilder> AdaptiveStage<B> {
    /// Build and start an initial stage at the builder's current target.
    ///
    /// # Errors
    ///
    /// Propagates the initial [`StageBuilder::build`] failure.
    pub fn new(config: UpdateConfig, builder: B) -> PipelineResult<Self> {
        let wrapper = Self::deferred(config, builder);
        let stage = Arc::new(wrapper.builder.build()?);
        stage.start();
        *wrapper.slot.write() = Some(stage);
        Ok(wrapper)
    }

    /// Start with no stage installed; readers block (bounded by the config's
    /// ready timeout) until the first successful [`adapt`](Self::adapt).
    #[must_use]
    pub fn deferred(config: UpdateConfig, builder: B) -> Self {
        Self {
            builder,
            config,
            slot: RwLock::new(None),
            installed: Notify::new(),
            swap_gate: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Retarget the stage, rebuilding and swapping when the change is large
    /// enough.
    ///
    /// The new instance is built and started before the swap; any failure up
    /// to that point leaves the currently serving stage untouched. The old
    /// instance is closed only after the swap, so readers either finish
    /// against it or retry against its successor.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Closed`] after [`close`](Self::close),
    /// otherwise propagates builder failures.
    pub fn adapt(&self, target: u64) -> PipelineResult<()> {
        let _gate = self.swap_gate.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(PipelineError::Closed);
        }

        let clamped = target.clamp(self.config.min_target, self.config.max_target);
        let current = self.slot.read().clone();

        // Hysteresis applies only against a live, rate-reporting instance;
        // a deferred wrapper takes its first target unconditionally.
        if let Some(applied) = current
            .as_deref()
            .and_then(Stage::as_rate_reporter)
            .and_then(|r| r.current_rate().ok())
            .filter(|&applied| applied > 0)
        {
            let change_pct = applied.abs_diff(clamped).saturating_mul(100) / applied;
            if change_pct < self.config.min_change_pct {
                debug!(
                    target = clamped,
                    applied, change_pct, "change below threshold, keeping stage"
                );
                return Ok(());
            }
        }

        self.builder.set_target(clamped)?;
        let fresh = Arc::new(self.builder.build()?);
        fresh.start();

        let old = self.slot.write().replace(fresh);
        self.installed.notify_waiters();
        if let Some(old) = old {
            old.close();
        }
        info!(target = clamped, "stage reconfigured");
        Ok(())
    }

    fn current_stage(&self) -> Option<Arc<B::Stage>> {
        self.slot.read().clone()
    }

    async fn wait_installed(&self) -> PipelineResult<()> {
        let notified = self.installed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        // A swap between our empty-slot observation and enabling the waiter
        // is caught by this re-check.
        if self.slot.read().is_some() || self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        tokio::time::timeout(self.config.ready_timeout, notified)
            .await
            .map_err(|_| PipelineError::NotReady)?;
        Ok(())
    }
}

#[async_trait]
impl<B: StageBuilder> Stage for AdaptiveStage<B> {
    type Item = <B::Stage as Stage>::Item;

    async fn get(&self) -> PipelineResult<Self::Item> {
        loop {
            let Some(stage) = self.current_stage() else {
                if self.closed.load(Ordering::Acquire) {
                    return Err(PipelineError::Closed);
                }
                self.wait_installed().await?;
                continue;
            };

            match stage.get().await {
                Ok(item) => return Ok(item),
                Err(PipelineError::Closed) => {
                    if self.closed.load(Ordering::Acquire) {
                        return Err(PipelineError::Closed);
                    }
                    // A swap may have closed this instance mid-read; retry
                    // only when a different one took its place.
                    match self.current_stage() {
                        Some(now) if !Arc::ptr_eq(&now, &stage) => continue,
                        _ => return Err(PipelineError::Closed),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn put_back(&self, item: Self::Item) {
        if let Some(stage) = self.current_stage() {
            stage.put_back(item);
        }
    }

    fn start(&self) {
        if let Some(stage) = self.current_stage() {
            stage.start();
        }
    }

    fn close(&self) {
        let _gate = self.swap_gate.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let stage = self.slot.write().take();
        self.installed.notify_waiters();
        if let Some(stage) = stage {
            stage.close();
        }
    }

    fn as_rate_reporter(&self) -> Option<&dyn RateReporter> {
        Some(self)
    }
}

impl<B: StageBuilder> RateReporter for AdaptiveStage<B> {
    fn current_rate(&self) -> PipelineResult<u64> {
        let stage = self.current_stage().ok_or(PipelineError::NotReady)?;
        stage
            .as_rate_reporter()
            .ok_or(PipelineError::InterfaceMismatch)?
            .current_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_inverted_bounds() {
        assert!(matches!(
            UpdateConfig::new(2_000_000, 1_000_000, 10),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(UpdateConfig::new(1_000_000, 2_000_000, 10).is_ok());
        assert!(UpdateConfig::new(500, 500, 0).is_ok());
    }
}
