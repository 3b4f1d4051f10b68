//! Generic pull/push processing stage.
//!
//! A [`ProcessStage`] owns one opaque [`MediaProcessor`] (the native
//! demux/decode/filter/encode context together with its upstream) and runs a
//! single loop task that fills pooled items and pushes them into a bounded
//! output channel. Consumers pull through the uniform [`Stage`] interface.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::{PipelineError, PipelineResult},
    pool::{Pool, Reuse},
    settings::CodecSettings,
    stage::{RateReporter, Stage},
};

/// The opaque processing context behind a stage.
///
/// Implementations wrap native transcode state and pull from their own
/// upstream producer; this crate never sees either directly.
#[async_trait]
pub trait MediaProcessor: Send + 'static {
    /// The unit produced (packet, frame).
    type Item: Reuse + Default + Send + 'static;

    /// Fill `out` with the next processed item.
    ///
    /// Returns `Ok(true)` when an item was produced, `Ok(false)` at end of
    /// stream.
    ///
    /// # Errors
    ///
    /// A per-item failure; the stage loop logs it and keeps pulling
    /// (transient upstream hiccups must not kill the stage).
    async fn process_next(&mut self, out: &mut Self::Item) -> PipelineResult<bool>;

    /// Free native contexts. Called exactly once per processor.
    fn release(&mut self);
}

/// A [`Stage`] running one [`MediaProcessor`] behind a bounded output buffer.
pub struct ProcessStage<P: MediaProcessor> {
    processor: Mutex<Option<P>>,
    // Handed to the loop task at start; the loop owns the only sender, so
    // dropping it on exit is what closes the channel.
    tx: Mutex<Option<kanal::AsyncSender<P::Item>>>,
    rx: kanal::AsyncReceiver<P::Item>,
    pool: Arc<Pool<P::Item>>,
    settings: Option<Arc<dyn CodecSettings>>,
    cancel: CancellationToken,
    started: AtomicBool,
    closed: AtomicBool,
}

impl<P: MediaProcessor> ProcessStage<P> {
    /// `capacity` bounds the output buffer; the loop stalls against a full
    /// buffer rather than growing it.
    #[must_use]
    pub fn new(processor: P, capacity: usize, pool: Arc<Pool<P::Item>>) -> Self {
        let (tx, rx) = kanal::bounded_async(capacity);
        Self {
            processor: Mutex::new(Some(processor)),
            tx: Mutex::new(Some(tx)),
            rx,
            pool,
            settings: None,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Like [`new`](ProcessStage::new), additionally attaching the settings
    /// provider so the stage can report its current rate.
    #[must_use]
    pub fn with_settings(
        processor: P,
        capacity: usize,
        pool: Arc<Pool<P::Item>>,
        settings: Arc<dyn CodecSettings>,
    ) -> Self {
        let mut stage = Self::new(processor, capacity, pool);
        stage.settings = Some(settings);
        stage
    }
}

#[async_trait]
impl<P: MediaProcessor> Stage for ProcessStage<P> {
    type Item = P::Item;

    async fn get(&self) -> PipelineResult<Self::Item> {
        // The loop drops its sender on exit, so buffered items drain first;
        // only then do readers observe the closed channel.
        self.rx.recv().await.map_err(|_| PipelineError::Closed)
    }

    fn put_back(&self, item: Self::Item) {
        self.pool.recycle(item);
    }

    fn start(&self) {
        if self.closed.load(Ordering::Acquire) || self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let processor = self.processor.lock().take();
        let tx = self.tx.lock().take();
        let (Some(processor), Some(tx)) = (processor, tx) else {
            return;
        };
        tokio::spawn(run_loop(
            processor,
            tx,
            Arc::clone(&self.pool),
            self.cancel.clone(),
        ));
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        // Never-started stages still own the sender and the processor; a
        // started stage's loop drops both on its way out.
        drop(self.tx.lock().take());
        if let Some(mut processor) = self.processor.lock().take() {
            processor.release();
        }
    }

    fn as_rate_reporter(&self) -> Option<&dyn RateReporter> {
        self.settings.as_ref().map(|_| self as &dyn RateReporter)
    }
}

impl<P: MediaProcessor> RateReporter for ProcessStage<P> {
    fn current_rate(&self) -> PipelineResult<u64> {
        self.settings
            .as_ref()
            .and_then(|s| s.as_adaptive())
            .ok_or(PipelineError::InterfaceMismatch)?
            .current_rate()
    }
}

async fn run_loop<P: MediaProcessor>(
    mut processor: P,
    tx: kanal::AsyncSender<P::Item>,
    pool: Arc<Pool<P::Item>>,
    cancel: CancellationToken,
) {
    trace!("stage loop started");

    loop {
        let mut item = pool.get();
        let produced = tokio::select! {
            () = cancel.cancelled() => None,
            res = processor.process_next(&mut item) => Some(res),
        };

        match produced {
            None => {
                pool.recycle(item);
                break;
            }
            Some(Ok(true)) => {
                // A full buffer must not outlive a close request.
                let sent = tokio::select! {
                    () = cancel.cancelled() => break,
                    sent = tx.send(item) => sent,
                };
                if sent.is_err() {
                    debug!("output buffer closed, stopping stage loop");
                    break;
                }
            }
            Some(Ok(false)) => {
                pool.recycle(item);
                debug!("end of stream");
                break;
            }
            Some(Err(err)) => {
                pool.recycle(item);
                warn!(error = %err, "processor failed for one item, continuing");
            }
        }
    }

    // Dropping the only sender lets readers drain what is buffered, then
    // unblocks them with a closed-channel error instead of hanging.
    drop(tx);
    processor.release();
    trace!("stage loop stopped");
}
