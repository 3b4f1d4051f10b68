//! Thread-safe subscriber registry.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::{BandwidthError, BandwidthResult},
    priority::Priority,
};

/// Opaque failure from a consumer's update callback.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Receiver of bandwidth share updates.
///
/// Implemented by anything that can apply a new bitrate target: a track's
/// rate setter, or an adaptive pipeline stage's reconfiguration entry point.
///
/// An `Err` return is treated as "this consumer is gone" and causes immediate
/// unsubscription. Implementations that can be slow should respect the
/// dispatch timeout; a timed-out update is abandoned but the subscriber
/// stays registered.
#[async_trait]
pub trait BitrateSink: Send + Sync {
    /// Apply a new bitrate target in bits per second.
    async fn update_bitrate(&self, bps: u64) -> Result<(), SinkError>;
}

/// One registered bandwidth consumer.
#[derive(Clone)]
pub struct Subscriber {
    id: String,
    priority: Priority,
    sink: Arc<dyn BitrateSink>,
}

impl Subscriber {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn sink(&self) -> Arc<dyn BitrateSink> {
        Arc::clone(&self.sink)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Named consumers with priority weights.
///
/// Mutation happens under an exclusive lock; the distribution loop iterates
/// over value-copied snapshots so sinks are never invoked while either lock
/// is held. A sink that blocks can therefore never stall subscriber churn.
#[derive(Default)]
pub struct Registry {
    subs: RwLock<Vec<Subscriber>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer.
    ///
    /// # Errors
    ///
    /// Returns [`BandwidthError::AlreadyExists`] when `id` is already
    /// registered; the existing subscriber is left untouched.
    pub fn subscribe(
        &self,
        id: impl Into<String>,
        priority: Priority,
        sink: Arc<dyn BitrateSink>,
    ) -> BandwidthResult<()> {
        let id = id.into();
        let mut subs = self.subs.write();

        if subs.iter().any(|s| s.id == id) {
            return Err(BandwidthError::AlreadyExists(id));
        }

        tracing::debug!(id = %id, priority = %priority, "subscriber added");
        subs.push(Subscriber { id, priority, sink });
        Ok(())
    }

    /// Remove a consumer. Idempotent: an unknown id is not an error, since
    /// callers may race with failure-driven auto-removal.
    pub fn unsubscribe(&self, id: &str) {
        let mut subs = self.subs.write();
        if let Some(pos) = subs.iter().position(|s| s.id == id) {
            subs.swap_remove(pos);
            tracing::debug!(id, "subscriber removed");
        }
    }

    /// Change a consumer's weight. Returns false when the id is unknown.
    /// Takes effect on the next tick's snapshot.
    pub fn update_priority(&self, id: &str, priority: Priority) -> bool {
        let mut subs = self.subs.write();
        match subs.iter_mut().find(|s| s.id == id) {
            Some(sub) => {
                sub.priority = priority;
                true
            }
            None => false,
        }
    }

    /// Value copy of the current subscriber set, safe to iterate without
    /// holding the registry lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.subs.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    #[async_trait]
    impl BitrateSink for NullSink {
        async fn update_bitrate(&self, _bps: u64) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn sink() -> Arc<dyn BitrateSink> {
        Arc::new(NullSink)
    }

    #[test]
    fn duplicate_subscribe_fails_and_keeps_original() {
        let reg = Registry::new();
        reg.subscribe("mic", Priority::LEVEL2, sink()).unwrap();

        let err = reg.subscribe("mic", Priority::LEVEL5, sink()).unwrap_err();
        assert!(matches!(err, BandwidthError::AlreadyExists(id) if id == "mic"));

        let snapshot = reg.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].priority(), Priority::LEVEL2);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let reg = Registry::new();
        reg.subscribe("cam", Priority::LEVEL1, sink()).unwrap();

        reg.unsubscribe("cam");
        reg.unsubscribe("cam");
        reg.unsubscribe("never-existed");

        assert!(reg.is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let reg = Registry::new();
        reg.subscribe("a", Priority::LEVEL1, sink()).unwrap();

        let snapshot = reg.snapshot();
        reg.unsubscribe("a");

        assert_eq!(snapshot.len(), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn update_priority_changes_next_snapshot() {
        let reg = Registry::new();
        reg.subscribe("a", Priority::LEVEL1, sink()).unwrap();

        assert!(reg.update_priority("a", Priority::LEVEL4));
        assert!(!reg.update_priority("b", Priority::LEVEL4));

        assert_eq!(reg.snapshot()[0].priority(), Priority::LEVEL4);
    }
}
