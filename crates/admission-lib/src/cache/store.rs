//! Controller key -> cache entry map
//!
//! The map has its own lock, used only to look up or insert entries. It is
//! always released before an entry's lock is taken.

use super::entry::RecommendationCacheEntry;
use crate::models::ControllerKey;
use crate::observability::AdmissionMetrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Lazily populated cache of per-controller recommendation entries
#[derive(Default)]
pub struct RecommendationStore {
    entries: Mutex<HashMap<ControllerKey, Arc<RecommendationCacheEntry>>>,
}

impl RecommendationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ControllerKey, Arc<RecommendationCacheEntry>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Entry for `key`, created in the `Synchronized` state on first lookup
    pub fn get_or_create(&self, key: &ControllerKey) -> Arc<RecommendationCacheEntry> {
        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| {
            debug!(controller = %key, "Controller recommendation not exist, create new entry");
            Arc::new(RecommendationCacheEntry::new())
        });
        entry.touch();
        Arc::clone(entry)
    }

    /// Entry for `key` if it was ever looked up
    pub fn get(&self, key: &ControllerKey) -> Option<Arc<RecommendationCacheEntry>> {
        self.lock().get(key).cloned()
    }

    /// Number of cached controllers
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove entries idle for longer than `max_idle`.
    ///
    /// Entries still referenced outside the map (a request is dispatching,
    /// fetching or waiting on them) are kept regardless of idleness; new
    /// references can only be handed out under the map lock held here.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            let keep = Arc::strong_count(entry) > 1 || entry.idle_for() <= max_idle;
            if !keep {
                debug!(controller = %key, "Evicting idle controller recommendation entry");
            }
            keep
        });
        before - entries.len()
    }
}

/// Periodically evict entries idle for longer than `max_idle`.
///
/// Runs until the task is aborted.
pub async fn run_idle_sweeper(store: Arc<RecommendationStore>, max_idle: Duration, period: Duration) {
    let metrics = AdmissionMetrics::new();
    let mut ticker = tokio::time::interval(period);
    info!(
        max_idle_secs = max_idle.as_secs(),
        period_secs = period.as_secs(),
        "Starting idle recommendation cache sweeper"
    );

    loop {
        ticker.tick().await;
        let evicted = store.evict_idle(max_idle);
        if evicted > 0 {
            debug!(evicted, remaining = store.len(), "Evicted idle cache entries");
        }
        metrics.set_cache_entries(store.len() as i64);
    }
}
