//! Tests for the recommendation cache
//!
//! These tests verify:
//! - Time-window dispatch and queue consumption
//! - The single-flight gate and its release paths
//! - Store lookups and idle eviction

use super::*;
use crate::models::{
    ContainerResourceRecommendation, ControllerKey, PodResourceRecommendation, TopController,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Helper to create a recommendation valid in [start, end]
fn create_test_recommendation(
    pod: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> PodResourceRecommendation {
    PodResourceRecommendation {
        namespace: "ns1".to_string(),
        name: pod.to_string(),
        top_controller: TopController {
            kind: "Deployment".to_string(),
            name: "foo".to_string(),
        },
        container_recommendations: vec![ContainerResourceRecommendation {
            name: "app".to_string(),
            ..Default::default()
        }],
        valid_start_time: start,
        valid_end_time: end,
    }
}

mod dispatch_tests {
    use super::*;

    #[test]
    fn test_dispatch_on_empty_queue_misses() {
        let entry = RecommendationCacheEntry::new();
        let now = Utc::now();

        assert!(entry.dispatch_one_valid(now).is_none());
        assert!(entry.dispatch_one_valid(now).is_none());
        assert!(entry.is_empty());
    }

    #[test]
    fn test_dispatch_returns_valid_recommendation_once() {
        let entry = RecommendationCacheEntry::new();
        let now = Utc::now();
        entry.append_recommendations(vec![create_test_recommendation(
            "p1",
            now - ChronoDuration::minutes(1),
            now + ChronoDuration::minutes(1),
        )]);

        let dispatched = entry.dispatch_one_valid(now).unwrap();
        assert_eq!(dispatched.name, "p1");

        // Never handed out twice
        assert!(entry.dispatch_one_valid(now).is_none());
        assert!(entry.is_empty());
    }

    #[test]
    fn test_dispatch_window_bounds_are_inclusive() {
        let entry = RecommendationCacheEntry::new();
        let now = Utc::now();
        entry.append_recommendations(vec![
            create_test_recommendation("starts-now", now, now + ChronoDuration::minutes(1)),
            create_test_recommendation("ends-now", now - ChronoDuration::minutes(1), now),
        ]);

        assert_eq!(entry.dispatch_one_valid(now).unwrap().name, "starts-now");
        assert_eq!(entry.dispatch_one_valid(now).unwrap().name, "ends-now");
    }

    #[test]
    fn test_dispatch_drops_stale_recommendations_ahead_of_valid_one() {
        let entry = RecommendationCacheEntry::new();
        let now = Utc::now();
        entry.append_recommendations(vec![
            create_test_recommendation(
                "expired-1",
                now - ChronoDuration::minutes(20),
                now - ChronoDuration::minutes(10),
            ),
            create_test_recommendation(
                "expired-2",
                now - ChronoDuration::minutes(10),
                now - ChronoDuration::minutes(5),
            ),
            create_test_recommendation(
                "current",
                now - ChronoDuration::minutes(1),
                now + ChronoDuration::minutes(1),
            ),
            create_test_recommendation(
                "next",
                now - ChronoDuration::minutes(1),
                now + ChronoDuration::minutes(1),
            ),
        ]);

        assert_eq!(entry.dispatch_one_valid(now).unwrap().name, "current");
        assert_eq!(entry.len(), 1);
        assert_eq!(entry.dispatch_one_valid(now).unwrap().name, "next");
        assert!(entry.is_empty());
    }

    #[test]
    fn test_dispatch_miss_leaves_queue_untouched() {
        let entry = RecommendationCacheEntry::new();
        let now = Utc::now();
        entry.append_recommendations(vec![
            create_test_recommendation(
                "expired",
                now - ChronoDuration::minutes(10),
                now - ChronoDuration::minutes(5),
            ),
            create_test_recommendation(
                "future",
                now + ChronoDuration::minutes(5),
                now + ChronoDuration::minutes(10),
            ),
        ]);

        assert!(entry.dispatch_one_valid(now).is_none());
        assert_eq!(entry.len(), 2);

        // Once the future window opens, the expired one goes with it
        let later = now + ChronoDuration::minutes(6);
        assert_eq!(entry.dispatch_one_valid(later).unwrap().name, "future");
        assert!(entry.is_empty());
    }

    #[test]
    fn test_append_keeps_arrival_order() {
        let entry = RecommendationCacheEntry::new();
        let now = Utc::now();
        let start = now - ChronoDuration::minutes(1);
        let end = now + ChronoDuration::minutes(1);

        entry.append_recommendations(vec![create_test_recommendation("a", start, end)]);
        entry.append_recommendations(vec![]);
        entry.append_recommendations(vec![
            create_test_recommendation("b", start, end),
            create_test_recommendation("a", start, end),
        ]);

        let names: Vec<String> = std::iter::from_fn(|| entry.dispatch_one_valid(now))
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "a"]);
    }
}

mod single_flight_tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_first_caller_owns_fetch() {
        let entry = RecommendationCacheEntry::new();
        assert_eq!(entry.state(), RecommendationState::Synchronized);

        let (previous, _) = entry.wait_or_sync();
        assert_eq!(previous, RecommendationState::Synchronized);
        assert_eq!(entry.state(), RecommendationState::WaitsSynchronizing);

        // Everybody else is told to wait
        let (previous, _) = entry.wait_or_sync();
        assert_eq!(previous, RecommendationState::WaitsSynchronizing);
        let (previous, _) = entry.wait_or_sync();
        assert_eq!(previous, RecommendationState::WaitsSynchronizing);

        entry.finish_sync();
        assert_eq!(entry.state(), RecommendationState::Synchronized);

        // Gate reopens for the next round
        let (previous, _) = entry.wait_or_sync();
        assert_eq!(previous, RecommendationState::Synchronized);
    }

    #[test]
    fn test_waiter_blocks_until_finish_sync() {
        let entry = Arc::new(RecommendationCacheEntry::new());

        let owner = match entry.begin_sync() {
            SyncRole::Owner(guard) => guard,
            SyncRole::Waiter(_) => panic!("first caller must own the fetch"),
        };
        let waiter = match entry.begin_sync() {
            SyncRole::Waiter(waiter) => waiter,
            SyncRole::Owner(_) => panic!("second caller must wait"),
        };

        let mut wait = task::spawn(waiter.wait());
        assert_pending!(wait.poll());

        owner.complete(vec![]);
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
        assert_eq!(entry.state(), RecommendationState::Synchronized);
    }

    #[test]
    fn test_dropped_guard_releases_waiters() {
        let entry = Arc::new(RecommendationCacheEntry::new());

        let owner = match entry.begin_sync() {
            SyncRole::Owner(guard) => guard,
            SyncRole::Waiter(_) => panic!("first caller must own the fetch"),
        };
        let waiter = match entry.begin_sync() {
            SyncRole::Waiter(waiter) => waiter,
            SyncRole::Owner(_) => panic!("second caller must wait"),
        };

        let mut wait = task::spawn(waiter.wait());
        assert_pending!(wait.poll());

        // Fetch failed, timed out or the owning task was cancelled
        drop(owner);
        assert_ready!(wait.poll());
        assert_eq!(entry.state(), RecommendationState::NeedsSynchronizing);

        // Next caller retries immediately
        match entry.begin_sync() {
            SyncRole::Owner(guard) => {
                assert_eq!(guard.previous_state(), RecommendationState::NeedsSynchronizing)
            }
            SyncRole::Waiter(_) => panic!("gate must be open after an abandoned round"),
        }
    }

    #[test]
    fn test_waiter_joining_finished_round_does_not_block() {
        let entry = Arc::new(RecommendationCacheEntry::new());
        let owner = match entry.begin_sync() {
            SyncRole::Owner(guard) => guard,
            SyncRole::Waiter(_) => panic!("first caller must own the fetch"),
        };
        let waiter = match entry.begin_sync() {
            SyncRole::Waiter(waiter) => waiter,
            SyncRole::Owner(_) => panic!("second caller must wait"),
        };
        owner.complete(vec![]);

        let mut wait = task::spawn(waiter.wait());
        assert_ready!(wait.poll());
    }

    #[test]
    fn test_completed_guard_queues_recommendations() {
        let entry = Arc::new(RecommendationCacheEntry::new());
        let now = Utc::now();

        if let SyncRole::Owner(guard) = entry.begin_sync() {
            guard.complete(vec![create_test_recommendation(
                "p1",
                now - ChronoDuration::minutes(1),
                now + ChronoDuration::minutes(1),
            )]);
        } else {
            panic!("first caller must own the fetch");
        }

        assert_eq!(entry.state(), RecommendationState::Synchronized);
        assert_eq!(entry.dispatch_one_valid(now).unwrap().name, "p1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_produce_one_owner() {
        let entry = Arc::new(RecommendationCacheEntry::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let entry = Arc::clone(&entry);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                let (previous, _) = entry.wait_or_sync();
                previous != RecommendationState::WaitsSynchronizing
            }));
        }

        let mut owners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                owners += 1;
            }
        }
        assert_eq!(owners, 1);
    }
}

mod store_tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_same_entry() {
        let store = RecommendationStore::new();
        let key = ControllerKey::new("ns1", "Deployment", "foo");

        let first = store.get_or_create(&key);
        let second = store.get_or_create(&key);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
        assert_eq!(first.state(), RecommendationState::Synchronized);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = RecommendationStore::new();
        let foo = store.get_or_create(&ControllerKey::new("ns1", "Deployment", "foo"));
        let bar = store.get_or_create(&ControllerKey::new("ns1", "StatefulSet", "foo"));
        let other_ns = store.get_or_create(&ControllerKey::new("ns2", "Deployment", "foo"));

        assert!(!Arc::ptr_eq(&foo, &bar));
        assert!(!Arc::ptr_eq(&foo, &other_ns));
        assert_eq!(store.len(), 3);

        let (previous, _) = foo.wait_or_sync();
        assert_eq!(previous, RecommendationState::Synchronized);
        assert_eq!(bar.state(), RecommendationState::Synchronized);
    }

    #[test]
    fn test_get_does_not_create() {
        let store = RecommendationStore::new();
        let key = ControllerKey::new("ns1", "Deployment", "foo");

        assert!(store.get(&key).is_none());
        assert!(store.is_empty());
        store.get_or_create(&key);
        assert!(store.get(&key).is_some());
    }

    #[test]
    fn test_evict_idle_removes_unreferenced_entries() {
        let store = RecommendationStore::new();
        let idle = ControllerKey::new("ns1", "Deployment", "idle");
        let busy = ControllerKey::new("ns1", "Deployment", "busy");

        store.get_or_create(&idle);
        let busy_entry = store.get_or_create(&busy);

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(store.evict_idle(Duration::from_millis(5)), 1);
        assert!(store.get(&idle).is_none());
        assert!(store.get(&busy).is_some());
        drop(busy_entry);
    }

    #[test]
    fn test_evict_idle_keeps_recent_entries() {
        let store = RecommendationStore::new();
        store.get_or_create(&ControllerKey::new("ns1", "Deployment", "foo"));

        assert_eq!(store.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_in_background() {
        let store = Arc::new(RecommendationStore::new());
        store.get_or_create(&ControllerKey::new("ns1", "Deployment", "foo"));

        let sweeper = tokio::spawn(run_idle_sweeper(
            Arc::clone(&store),
            Duration::from_millis(10),
            Duration::from_millis(20),
        ));
        tokio::time::sleep(Duration::from_millis(200)).await;
        sweeper.abort();

        assert!(store.is_empty());
    }
}
