//! Periodic bandwidth distribution loop.

use std::{sync::Arc, time::Duration};

use parking_lot::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::{BandwidthError, BandwidthResult},
    estimator::BandwidthEstimator,
    priority::Priority,
    registry::{BitrateSink, Registry, Subscriber},
};

/// Distribution loop lifecycle. `Stopped` is terminal: a fresh controller
/// must be constructed to restart distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Stopped,
}

/// Distribution loop configuration.
#[derive(Clone, Copy, Debug)]
pub struct ControllerOptions {
    /// Tick interval. Each tick samples the estimator once and dispatches
    /// every active subscriber's share.
    pub interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Distributes one bandwidth estimate across prioritized subscribers.
///
/// Every `interval`, the controller samples the attached
/// [`BandwidthEstimator`] and dispatches
/// `share_i = floor(B * weight_i / total_weight)` to each active subscriber
/// as an independent task bounded by `interval / active_count`. Integer
/// truncation is the rounding policy: shares may under-allocate by rounding
/// error but can never over-allocate.
///
/// Expected steady-state conditions (no estimator attached, empty subscriber
/// set, zero total priority, estimator unavailable) skip the tick silently.
pub struct BandwidthController {
    registry: Arc<Registry>,
    estimator: RwLock<Option<Arc<dyn BandwidthEstimator>>>,
    opts: ControllerOptions,
    state: Mutex<ControllerState>,
    cancel: CancellationToken,
}

impl BandwidthController {
    #[must_use]
    pub fn new(opts: ControllerOptions) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            estimator: RwLock::new(None),
            opts,
            state: Mutex::new(ControllerState::Idle),
            cancel: CancellationToken::new(),
        }
    }

    /// The subscriber registry, for callers that manage subscriptions
    /// independently of the controller handle.
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Attach the estimate source. May happen before or after [`start`];
    /// ticks without an estimator are skipped.
    ///
    /// [`start`]: BandwidthController::start
    pub fn attach_estimator(&self, estimator: Arc<dyn BandwidthEstimator>) {
        *self.estimator.write() = Some(estimator);
    }

    /// See [`Registry::subscribe`].
    ///
    /// # Errors
    ///
    /// Returns [`BandwidthError::AlreadyExists`] on a duplicate id.
    pub fn subscribe(
        &self,
        id: impl Into<String>,
        priority: Priority,
        sink: Arc<dyn BitrateSink>,
    ) -> BandwidthResult<()> {
        self.registry.subscribe(id, priority, sink)
    }

    /// See [`Registry::unsubscribe`].
    pub fn unsubscribe(&self, id: &str) {
        self.registry.unsubscribe(id);
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.state.lock()
    }

    /// Spawn the periodic distribution task.
    ///
    /// # Errors
    ///
    /// Returns [`BandwidthError::InvalidState`] when the controller is
    /// already running or has been stopped.
    pub fn start(self: &Arc<Self>) -> BandwidthResult<()> {
        {
            let mut state = self.state.lock();
            if *state != ControllerState::Idle {
                return Err(BandwidthError::InvalidState(*state));
            }
            *state = ControllerState::Running;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await });
        debug!(interval = ?self.opts.interval, "bandwidth controller started");
        Ok(())
    }

    /// Stop distribution after the current tick. Terminal and idempotent.
    /// Also closes the attached estimator.
    pub fn close(&self) {
        *self.state.lock() = ControllerState::Stopped;
        self.cancel.cancel();
        if let Some(estimator) = self.estimator.read().as_ref() {
            estimator.close();
        }
    }

    async fn run(&self) {
        // First tick fires one interval after start, not immediately.
        let first = tokio::time::Instant::now() + self.opts.interval;
        let mut ticker = tokio::time::interval_at(first, self.opts.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.tick(),
            }
        }

        *self.state.lock() = ControllerState::Stopped;
        debug!("bandwidth controller stopped");
    }

    /// One distribution round over a single consistent snapshot.
    fn tick(&self) {
        let Some(estimator) = self.estimator.read().clone() else {
            return;
        };

        let subs = self.registry.snapshot();
        if subs.is_empty() {
            return;
        }

        let total_weight: u64 = subs.iter().map(|s| s.priority().weight()).sum();
        if total_weight == 0 {
            return;
        }

        let bitrate = match estimator.target_bitrate() {
            Ok(bps) => bps,
            Err(err) => {
                trace!(error = %err, "skipping tick");
                return;
            }
        };

        let active = subs.iter().filter(|s| !s.priority().is_inactive()).count();
        debug_assert!(active > 0, "non-zero total weight implies an active sub");
        let timeout = self.opts.interval / active as u32;

        for sub in subs.into_iter().filter(|s| !s.priority().is_inactive()) {
            let share = compute_share(bitrate, sub.priority().weight(), total_weight);
            let registry = Arc::clone(&self.registry);
            let cancel = self.cancel.clone();
            tokio::spawn(dispatch(registry, sub, share, timeout, cancel));
        }
    }
}

/// `floor(bitrate * weight / total)`, widened so the product cannot overflow.
fn compute_share(bitrate: u64, weight: u64, total_weight: u64) -> u64 {
    let share = u128::from(bitrate) * u128::from(weight) / u128::from(total_weight);
    u64::try_from(share).unwrap_or(u64::MAX)
}

/// Deliver one share to one subscriber, bounded by `timeout`.
///
/// A sink error unsubscribes the consumer immediately; a timeout abandons
/// the wait but keeps the consumer registered (slowness is not proof of
/// failure). Neither outcome propagates: the loop survives any number of
/// failing subscribers.
async fn dispatch(
    registry: Arc<Registry>,
    sub: Subscriber,
    share: u64,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let sink = sub.sink();
    let update = tokio::time::timeout(timeout, sink.update_bitrate(share));

    tokio::select! {
        () = cancel.cancelled() => {
            trace!(id = sub.id(), "bitrate dispatch abandoned on shutdown");
        }
        outcome = update => match outcome {
            Ok(Ok(())) => trace!(id = sub.id(), share, "bitrate update delivered"),
            Ok(Err(err)) => {
                warn!(id = sub.id(), error = %err, "bitrate update failed, unsubscribing");
                registry.unsubscribe(sub.id());
            }
            Err(_) => warn!(id = sub.id(), share, "bitrate update timed out"),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use rstest::rstest;

    use super::*;
    use crate::{
        estimator::{MockBandwidthEstimator, SharedEstimate},
        registry::SinkError,
    };

    /// Sink that records every share it receives.
    #[derive(Default)]
    struct RecordingSink {
        shares: Mutex<Vec<u64>>,
        fail: AtomicBool,
    }

    impl RecordingSink {
        fn received(&self) -> Vec<u64> {
            self.shares.lock().clone()
        }
    }

    #[async_trait]
    impl BitrateSink for RecordingSink {
        async fn update_bitrate(&self, bps: u64) -> Result<(), SinkError> {
            if self.fail.load(Ordering::Acquire) {
                return Err("sink torn down".into());
            }
            self.shares.lock().push(bps);
            Ok(())
        }
    }

    /// Sink that never completes within any timeout.
    struct StuckSink;

    #[async_trait]
    impl BitrateSink for StuckSink {
        async fn update_bitrate(&self, _bps: u64) -> Result<(), SinkError> {
            std::future::pending().await
        }
    }

    fn controller(interval: Duration) -> Arc<BandwidthController> {
        Arc::new(BandwidthController::new(ControllerOptions { interval }))
    }

    fn fixed_estimator(bps: u64) -> Arc<dyn BandwidthEstimator> {
        let estimate = SharedEstimate::new();
        estimate.publish(bps);
        Arc::new(estimate)
    }

    async fn run_ticks(n: u32, interval: Duration) {
        // Land just past the nth tick deadline, then let the loop task and
        // its spawned dispatches run to completion.
        tokio::time::sleep(interval * n + Duration::from_millis(1)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[rstest]
    #[case(600_000, 1, 6, 100_000)]
    #[case(600_000, 2, 6, 200_000)]
    #[case(600_000, 3, 6, 300_000)]
    #[case(1_000_000, 1, 3, 333_333)]
    #[case(u64::MAX, 3, 3, u64::MAX)]
    fn share_is_floored_and_never_over_allocates(
        #[case] bitrate: u64,
        #[case] weight: u64,
        #[case] total: u64,
        #[case] expected: u64,
    ) {
        let share = compute_share(bitrate, weight, total);
        assert_eq!(share, expected);
        assert!(share <= bitrate);
    }

    #[tokio::test(start_paused = true)]
    async fn shares_follow_priority_weights() {
        let interval = Duration::from_millis(100);
        let ctl = controller(interval);
        ctl.attach_estimator(fixed_estimator(600_000));

        let low = Arc::new(RecordingSink::default());
        let mid = Arc::new(RecordingSink::default());
        let high = Arc::new(RecordingSink::default());
        ctl.subscribe("low", Priority::LEVEL1, low.clone()).unwrap();
        ctl.subscribe("mid", Priority::LEVEL2, mid.clone()).unwrap();
        ctl.subscribe("high", Priority::LEVEL3, high.clone())
            .unwrap();

        ctl.start().unwrap();
        run_ticks(1, interval).await;

        assert_eq!(low.received(), vec![100_000]);
        assert_eq!(mid.received(), vec![200_000]);
        assert_eq!(high.received(), vec![300_000]);

        ctl.close();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sink_is_unsubscribed_and_bandwidth_redistributed() {
        let interval = Duration::from_millis(100);
        let ctl = controller(interval);
        ctl.attach_estimator(fixed_estimator(600_000));

        let low = Arc::new(RecordingSink::default());
        let mid = Arc::new(RecordingSink::default());
        let broken = Arc::new(RecordingSink::default());
        broken.fail.store(true, Ordering::Release);

        ctl.subscribe("low", Priority::LEVEL1, low.clone()).unwrap();
        ctl.subscribe("mid", Priority::LEVEL2, mid.clone()).unwrap();
        ctl.subscribe("broken", Priority::LEVEL3, broken.clone())
            .unwrap();

        ctl.start().unwrap();
        run_ticks(1, interval).await;
        assert_eq!(ctl.registry().len(), 2, "broken sink should be removed");

        run_ticks(1, interval).await;
        assert_eq!(low.received(), vec![100_000, 200_000]);
        assert_eq!(mid.received(), vec![200_000, 400_000]);
        assert!(broken.received().is_empty());

        ctl.close();
    }

    #[tokio::test(start_paused = true)]
    async fn priority_zero_subscriber_never_receives_a_dispatch() {
        let interval = Duration::from_millis(100);
        let ctl = controller(interval);
        ctl.attach_estimator(fixed_estimator(600_000));

        let muted = Arc::new(RecordingSink::default());
        let active = Arc::new(RecordingSink::default());
        ctl.subscribe("muted", Priority::LEVEL0, muted.clone())
            .unwrap();
        ctl.subscribe("active", Priority::LEVEL2, active.clone())
            .unwrap();

        ctl.start().unwrap();
        run_ticks(2, interval).await;

        assert!(muted.received().is_empty());
        // The inactive subscriber is excluded from the weight sum too.
        assert_eq!(active.received(), vec![600_000, 600_000]);

        ctl.close();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_total_priority_skips_the_tick() {
        let interval = Duration::from_millis(100);
        let ctl = controller(interval);
        ctl.attach_estimator(fixed_estimator(600_000));

        let muted = Arc::new(RecordingSink::default());
        ctl.subscribe("muted", Priority::LEVEL0, muted.clone())
            .unwrap();

        ctl.start().unwrap();
        run_ticks(3, interval).await;

        assert!(muted.received().is_empty());
        assert_eq!(ctl.registry().len(), 1, "skipped, not unsubscribed");

        ctl.close();
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_estimator_skips_without_dispatch() {
        let interval = Duration::from_millis(100);
        let ctl = controller(interval);

        let mut estimator = MockBandwidthEstimator::new();
        estimator
            .expect_target_bitrate()
            .returning(|| Err(BandwidthError::EstimatorUnavailable));
        estimator.expect_close().return_const(());
        ctl.attach_estimator(Arc::new(estimator));

        let sink = Arc::new(RecordingSink::default());
        ctl.subscribe("a", Priority::LEVEL1, sink.clone()).unwrap();

        ctl.start().unwrap();
        run_ticks(2, interval).await;

        assert!(sink.received().is_empty());
        ctl.close();
    }

    #[tokio::test(start_paused = true)]
    async fn no_estimator_attached_is_a_noop_tick() {
        let interval = Duration::from_millis(100);
        let ctl = controller(interval);

        let sink = Arc::new(RecordingSink::default());
        ctl.subscribe("a", Priority::LEVEL1, sink.clone()).unwrap();

        ctl.start().unwrap();
        run_ticks(2, interval).await;
        assert!(sink.received().is_empty());

        // Attaching mid-flight picks up on the next tick.
        ctl.attach_estimator(fixed_estimator(400_000));
        run_ticks(1, interval).await;
        assert_eq!(sink.received(), vec![400_000]);

        ctl.close();
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_sink_stays_subscribed() {
        let interval = Duration::from_millis(100);
        let ctl = controller(interval);
        ctl.attach_estimator(fixed_estimator(600_000));

        ctl.subscribe("stuck", Priority::LEVEL1, Arc::new(StuckSink))
            .unwrap();

        ctl.start().unwrap();
        run_ticks(2, interval).await;

        assert_eq!(ctl.registry().len(), 1, "timeout is not proof of failure");
        ctl.close();
    }

    #[tokio::test(start_paused = true)]
    async fn controller_is_not_restartable() {
        let ctl = controller(Duration::from_millis(100));

        ctl.start().unwrap();
        assert!(matches!(
            ctl.start(),
            Err(BandwidthError::InvalidState(ControllerState::Running))
        ));

        ctl.close();
        tokio::task::yield_now().await;
        assert_eq!(ctl.state(), ControllerState::Stopped);
        assert!(matches!(
            ctl.start(),
            Err(BandwidthError::InvalidState(ControllerState::Stopped))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_ticking() {
        let interval = Duration::from_millis(100);
        let ctl = controller(interval);
        ctl.attach_estimator(fixed_estimator(600_000));

        let sink = Arc::new(RecordingSink::default());
        ctl.subscribe("a", Priority::LEVEL1, sink.clone()).unwrap();

        ctl.start().unwrap();
        run_ticks(1, interval).await;
        ctl.close();

        let before = sink.received().len();
        run_ticks(3, interval).await;
        assert_eq!(sink.received().len(), before);
    }
}
