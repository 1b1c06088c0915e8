//! In-memory recommendation cache
//!
//! This module provides:
//! - Per-controller recommendation queues with time-window dispatch
//! - Single-flight coordination so one request per controller hits upstream
//! - The store mapping controller keys to their entries

mod entry;
mod store;

#[cfg(test)]
mod tests;

pub use entry::{
    RecommendationCacheEntry, RecommendationState, SyncGuard, SyncRole, SyncWaiter,
};
pub use store::{run_idle_sweeper, RecommendationStore};
