//! Per-controller recommendation queue with single-flight synchronization
//!
//! Every entry cycles `Synchronized -> WaitsSynchronizing -> Synchronized` for
//! as long as its key lives. The first caller that finds the entry outside
//! `WaitsSynchronizing` owns the fetch; everybody else waits on the watch
//! channel of that round until the owner releases it.

use crate::models::PodResourceRecommendation;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// Synchronization state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationState {
    /// Last fetch completed; the queue holds whatever it returned
    Synchronized,
    /// Last fetch failed or was abandoned; the next miss fetches again
    NeedsSynchronizing,
    /// A fetch is in flight; misses wait for it
    WaitsSynchronizing,
}

impl RecommendationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationState::Synchronized => "synchronized",
            RecommendationState::NeedsSynchronizing => "needs_synchronizing",
            RecommendationState::WaitsSynchronizing => "waits_synchronizing",
        }
    }
}

struct EntryInner {
    state: RecommendationState,
    sync_signal: watch::Sender<bool>,
    recommendations: VecDeque<PodResourceRecommendation>,
}

/// Cached recommendations of one controller
pub struct RecommendationCacheEntry {
    inner: Mutex<EntryInner>,
    created: Instant,
    /// Milliseconds after `created` of the last lookup; read without the lock
    last_access_ms: AtomicU64,
}

impl Default for RecommendationCacheEntry {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommendationCacheEntry {
    pub fn new() -> Self {
        let (sync_signal, _) = watch::channel(true);
        Self {
            inner: Mutex::new(EntryInner {
                state: RecommendationState::Synchronized,
                sync_signal,
                recommendations: VecDeque::new(),
            }),
            created: Instant::now(),
            last_access_ms: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntryInner> {
        // No code path panics while holding the lock, recover the data anyway
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current synchronization state
    pub fn state(&self) -> RecommendationState {
        self.lock().state
    }

    /// Number of queued recommendations
    pub fn len(&self) -> usize {
        self.lock().recommendations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().recommendations.is_empty()
    }

    /// Record a lookup of this entry
    pub fn touch(&self) {
        let elapsed = self.created.elapsed().as_millis() as u64;
        self.last_access_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Time since the entry was last looked up
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_access_ms.load(Ordering::Relaxed));
        self.created.elapsed().saturating_sub(last)
    }

    /// Enter the single-flight gate.
    ///
    /// Returns the state found on entry together with the signal of the round
    /// the caller joined. Any previous state other than `WaitsSynchronizing`
    /// means the caller now owns the fetch and must call [`finish_sync`] (or
    /// [`abandon_sync`]) when done; otherwise it should wait on the signal.
    ///
    /// [`finish_sync`]: Self::finish_sync
    /// [`abandon_sync`]: Self::abandon_sync
    pub fn wait_or_sync(&self) -> (RecommendationState, watch::Receiver<bool>) {
        let mut inner = self.lock();
        let previous = inner.state;
        if previous != RecommendationState::WaitsSynchronizing {
            let (tx, _) = watch::channel(false);
            inner.sync_signal = tx;
            inner.state = RecommendationState::WaitsSynchronizing;
        }
        (previous, inner.sync_signal.subscribe())
    }

    /// Close the current round after a completed fetch
    pub fn finish_sync(&self) {
        self.release(RecommendationState::Synchronized);
    }

    /// Close the current round after a failed or cancelled fetch
    pub fn abandon_sync(&self) {
        self.release(RecommendationState::NeedsSynchronizing);
    }

    fn release(&self, next: RecommendationState) {
        let mut inner = self.lock();
        inner.state = next;
        inner.sync_signal.send_replace(true);
    }

    /// Append freshly fetched recommendations in arrival order
    pub fn append_recommendations(&self, recommendations: Vec<PodResourceRecommendation>) {
        if recommendations.is_empty() {
            return;
        }
        let mut inner = self.lock();
        inner.recommendations.extend(recommendations);
    }

    /// Take the first recommendation valid at `now`.
    ///
    /// Everything queued before it is dropped along with it. When nothing is
    /// valid the queue is left as it is.
    pub fn dispatch_one_valid(&self, now: DateTime<Utc>) -> Option<PodResourceRecommendation> {
        let mut inner = self.lock();
        let position = inner
            .recommendations
            .iter()
            .position(|r| r.is_valid_at(now))?;

        if position > 0 {
            debug!(skipped = position, "Dropping recommendations queued before the valid one");
        }
        inner.recommendations.drain(..=position).last()
    }

    /// Start a sync round, or join the one in flight
    pub fn begin_sync(self: &Arc<Self>) -> SyncRole {
        let (previous, signal) = self.wait_or_sync();
        if previous == RecommendationState::WaitsSynchronizing {
            SyncRole::Waiter(SyncWaiter { signal })
        } else {
            SyncRole::Owner(SyncGuard {
                entry: Arc::clone(self),
                previous,
                completed: false,
            })
        }
    }
}

/// Outcome of [`RecommendationCacheEntry::begin_sync`]
pub enum SyncRole {
    /// Caller must fetch; dropping the guard releases waiters
    Owner(SyncGuard),
    /// Another caller is fetching
    Waiter(SyncWaiter),
}

/// Fetch ownership of one sync round.
///
/// Dropping the guard always closes the round, so waiters are released even
/// when the owning task errors out, times out or is cancelled mid-fetch.
pub struct SyncGuard {
    entry: Arc<RecommendationCacheEntry>,
    previous: RecommendationState,
    completed: bool,
}

impl SyncGuard {
    /// State the entry was in before this round started
    pub fn previous_state(&self) -> RecommendationState {
        self.previous
    }

    /// Queue the fetched recommendations and close the round as synchronized
    pub fn complete(mut self, recommendations: Vec<PodResourceRecommendation>) {
        self.entry.append_recommendations(recommendations);
        self.completed = true;
        self.entry.finish_sync();
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.entry.abandon_sync();
        }
    }
}

/// Handle on a sync round owned by someone else
pub struct SyncWaiter {
    signal: watch::Receiver<bool>,
}

impl SyncWaiter {
    /// Wait until the owner closes the round
    pub async fn wait(mut self) {
        // A dropped sender also means the round is over
        let _ = self.signal.wait_for(|done| *done).await;
    }
}
