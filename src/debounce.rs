use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::watch, time::sleep};
use tracing::debug;

pub const QUIET_MIN_MS: u64 = 300;
pub const QUIET_MAX_MS: u64 = 500;

/// A lookup result together with the input and sequence number that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Settled<T> {
    pub seq: u64,
    pub input: String,
    pub value: T,
}

/// Runs a lookup once input has been quiet for a while.
///
/// Scheduling again before the quiet period ends drops the earlier timer.
/// Lookups that already started are left to finish, but a response is only
/// published if no newer one has been published before it.
pub struct Debouncer<T> {
    quiet: Duration,
    scheduled: Arc<AtomicU64>,
    results: Arc<watch::Sender<Option<Settled<T>>>>,
}

impl<T> Debouncer<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(quiet: Duration) -> Self {
        let (results, _) = watch::channel(None);
        Self {
            quiet,
            scheduled: Arc::new(AtomicU64::new(0)),
            results: Arc::new(results),
        }
    }

    /// Quiet period in milliseconds, clamped to 300..=500.
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms.clamp(QUIET_MIN_MS, QUIET_MAX_MS)))
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Settled<T>>> {
        self.results.subscribe()
    }

    /// Drops whatever timer is pending.
    pub fn cancel(&self) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
    }

    /// Schedules `lookup(input)` after the quiet period and returns its sequence number.
    pub fn schedule<F, Fut>(&self, input: impl Into<String>, lookup: F) -> u64
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let input = input.into();
        let seq = self.scheduled.fetch_add(1, Ordering::SeqCst) + 1;
        let scheduled = Arc::clone(&self.scheduled);
        let results = Arc::clone(&self.results);
        let quiet = self.quiet;

        tokio::spawn(async move {
            sleep(quiet).await;
            if scheduled.load(Ordering::SeqCst) != seq {
                debug!(seq, "debounced lookup superseded before firing");
                return;
            }

            let value = lookup(input.clone()).await;
            let applied = results.send_if_modified(|current| {
                let newer = current.as_ref().map_or(true, |settled| settled.seq < seq);
                if newer {
                    *current = Some(Settled { seq, input, value });
                }
                newer
            });
            if !applied {
                debug!(seq, "stale lookup response dropped");
            }
        });

        seq
    }
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn latest(&self) -> Option<Settled<T>> {
        self.results.borrow().clone()
    }
}
