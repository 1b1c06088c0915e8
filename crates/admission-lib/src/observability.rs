//! Observability infrastructure for the admission controller
//!
//! Provides:
//! - Prometheus metrics (admission outcomes, cache dispatch, upstream fetch latency and failures)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for upstream fetch latency (in seconds)
const FETCH_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AdmissionMetricsInner> = OnceLock::new();

struct AdmissionMetricsInner {
    admission_requests: IntCounterVec,
    patches_applied: IntCounter,
    cache_dispatch: IntCounterVec,
    fetch_latency_seconds: Histogram,
    fetch_failures: IntCounterVec,
    owner_resolution_failures: IntCounterVec,
    cache_entries: IntGauge,
}

impl AdmissionMetricsInner {
    fn new() -> Self {
        Self {
            admission_requests: register_int_counter_vec!(
                "admission_controller_requests_total",
                "Admission reviews handled, by outcome",
                &["outcome"]
            )
            .expect("Failed to register admission_requests"),

            patches_applied: register_int_counter!(
                "admission_controller_patches_applied_total",
                "Pods admitted with a resource patch"
            )
            .expect("Failed to register patches_applied"),

            cache_dispatch: register_int_counter_vec!(
                "admission_controller_cache_dispatch_total",
                "Recommendation cache lookups, by result",
                &["result"]
            )
            .expect("Failed to register cache_dispatch"),

            fetch_latency_seconds: register_histogram!(
                "admission_controller_fetch_latency_seconds",
                "Time spent fetching recommendations from the upstream source",
                FETCH_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_latency_seconds"),

            fetch_failures: register_int_counter_vec!(
                "admission_controller_fetch_failures_total",
                "Failed upstream recommendation fetches, by reason",
                &["reason"]
            )
            .expect("Failed to register fetch_failures"),

            owner_resolution_failures: register_int_counter_vec!(
                "admission_controller_owner_resolution_failures_total",
                "Failed owner reference chain walks, by reason",
                &["reason"]
            )
            .expect("Failed to register owner_resolution_failures"),

            cache_entries: register_int_gauge!(
                "admission_controller_cache_entries",
                "Number of controllers with a recommendation cache entry"
            )
            .expect("Failed to register cache_entries"),
        }
    }
}

/// Admission controller metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct AdmissionMetrics {
    _private: (),
}

impl Default for AdmissionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AdmissionMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AdmissionMetricsInner {
        GLOBAL_METRICS.get_or_init(AdmissionMetricsInner::new)
    }

    /// Count a handled admission review
    pub fn inc_admission_request(&self, outcome: &str) {
        self.inner()
            .admission_requests
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_patches_applied(&self) {
        self.inner().patches_applied.inc();
    }

    /// Count a cache dispatch, `hit` or `miss`
    pub fn inc_cache_dispatch(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.inner().cache_dispatch.with_label_values(&[result]).inc();
    }

    /// Record an upstream fetch latency observation
    pub fn observe_fetch_latency(&self, duration_secs: f64) {
        self.inner().fetch_latency_seconds.observe(duration_secs);
    }

    pub fn inc_fetch_failures(&self, reason: &str) {
        self.inner()
            .fetch_failures
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_owner_resolution_failures(&self, reason: &str) {
        self.inner()
            .owner_resolution_failures
            .with_label_values(&[reason])
            .inc();
    }

    /// Update the cache size gauge
    pub fn set_cache_entries(&self, count: i64) {
        self.inner().cache_entries.set(count);
    }
}

/// Structured logger for admission controller events
///
/// Emits the service's significant events with an `event` field so they
/// can be filtered out of the JSON log stream.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a Pod admitted with a resource patch
    pub fn log_patch_applied(
        &self,
        namespace: &str,
        pod_name: &str,
        controller: &str,
        operations: usize,
    ) {
        info!(
            event = "patch_applied",
            instance = %self.instance,
            namespace = %namespace,
            pod_name = %pod_name,
            controller = %controller,
            operations = operations,
            "Patched pod resources from recommendation"
        );
    }

    /// Log a failed upstream fetch
    pub fn log_fetch_failure(&self, controller: &str, reason: &str, error: &str) {
        warn!(
            event = "fetch_failed",
            instance = %self.instance,
            controller = %controller,
            reason = %reason,
            error = %error,
            "Fetch recommendations failed"
        );
    }

    /// Log webhook configuration registration
    pub fn log_webhook_registered(&self, name: &str, service: &str) {
        info!(
            event = "webhook_registered",
            instance = %self.instance,
            webhook = %name,
            service = %service,
            "Mutating webhook configuration applied"
        );
    }

    /// Log controller startup
    pub fn log_startup(&self, version: &str, enabled: bool) {
        info!(
            event = "admission_controller_started",
            instance = %self.instance,
            version = %version,
            enabled = enabled,
            "Admission controller started"
        );
    }

    /// Log controller shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "admission_controller_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Admission controller shutting down"
        );
    }
}
