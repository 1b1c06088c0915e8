//! Admission request orchestration
//!
//! decode -> resolve owner -> dispatch -> (sync on miss -> dispatch) -> patch.
//! Every internal failure degrades to "allowed, unmodified" or to a review
//! without a decision; nothing here ever denies a Pod.

use super::patch::build_resource_patch;
use super::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use crate::cache::{RecommendationStore, SyncRole};
use crate::error::Error;
use crate::health::{Component, HealthRegistry};
use crate::models::{ControllerKey, PodResourceRecommendation};
use crate::observability::{AdmissionMetrics, StructuredLogger};
use crate::owner::OwnerChainResolver;
use crate::source::{fetch_with_timeout, RecommendationSource, DEFAULT_FETCH_TIMEOUT};
use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runtime switches of the admission controller
#[derive(Debug, Clone)]
pub struct AdmissionControllerConfig {
    /// When false every review is answered without a decision
    pub enable: bool,
    /// Bound on a single upstream fetch
    pub fetch_timeout: Duration,
}

impl Default for AdmissionControllerConfig {
    fn default() -> Self {
        Self {
            enable: true,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Mutating admission controller for Pod resources
pub struct AdmissionController {
    config: AdmissionControllerConfig,
    store: Arc<RecommendationStore>,
    resolver: OwnerChainResolver,
    source: Arc<dyn RecommendationSource>,
    health: HealthRegistry,
    metrics: AdmissionMetrics,
    logger: StructuredLogger,
}

impl AdmissionController {
    pub fn new(
        config: AdmissionControllerConfig,
        store: Arc<RecommendationStore>,
        resolver: OwnerChainResolver,
        source: Arc<dyn RecommendationSource>,
        health: HealthRegistry,
    ) -> Self {
        Self {
            config,
            store,
            resolver,
            source,
            health,
            metrics: AdmissionMetrics::new(),
            logger: StructuredLogger::new("admission-controller"),
        }
    }

    /// Replace the default structured logger
    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enable
    }

    pub fn store(&self) -> &Arc<RecommendationStore> {
        &self.store
    }

    /// Answer a raw `/pods` request body
    pub async fn serve(&self, content_type: Option<&str>, body: &[u8]) -> AdmissionReview {
        if !self.config.enable {
            warn!("Admission controller is not enabled, skip mutating pod");
            self.metrics.inc_admission_request("disabled");
            return AdmissionReview::reply(None, None);
        }

        if !content_type
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false)
        {
            warn!(content_type = ?content_type, "Unexpected content type, expect application/json");
        }

        let review: AdmissionReview = match serde_json::from_slice(body) {
            Ok(review) => review,
            Err(e) => {
                warn!(error = %e, "Unmarshal AdmissionReview failed");
                self.metrics.inc_admission_request("no_decision");
                return AdmissionReview::reply(None, None);
            }
        };

        let response = match review.request.as_ref() {
            Some(request) => self.mutate_pod(request).await,
            None => {
                warn!("AdmissionReview carries no request");
                None
            }
        };

        let outcome = match &response {
            None => "no_decision",
            Some(r) if r.patch.is_some() => "patched",
            Some(_) => "allowed",
        };
        self.metrics.inc_admission_request(outcome);

        AdmissionReview::reply(Some(&review.api_version), response)
    }

    /// Decide on a single admission request.
    ///
    /// `None` means no decision: the request is not a Pod or could not be
    /// decoded.
    pub async fn mutate_pod(&self, request: &AdmissionRequest) -> Option<AdmissionResponse> {
        if !request.resource.is_core_v1_pods() {
            warn!(
                group = %request.resource.group,
                version = %request.resource.version,
                resource = %request.resource.resource,
                "Expect resource to be core/v1 pods, skip mutating"
            );
            return None;
        }

        let Some(object) = request.object.as_ref() else {
            warn!(uid = %request.uid, "Admission request carries no object");
            return None;
        };
        let pod: Pod = match serde_json::from_value(object.clone()) {
            Ok(pod) => pod,
            Err(e) => {
                warn!(uid = %request.uid, error = %e, "Deserialize admission request object to Pod failed");
                return None;
            }
        };

        let namespace = request
            .namespace
            .clone()
            .or_else(|| pod.metadata.namespace.clone())
            .unwrap_or_default();
        let pod_name = pod
            .metadata
            .name
            .clone()
            .or_else(|| pod.metadata.generate_name.clone())
            .unwrap_or_default();
        let allow = AdmissionResponse::allow(request.uid.clone());

        let owner_references = pod.metadata.owner_references.as_deref().unwrap_or_default();
        let top = match self
            .resolver
            .resolve_root_controller(&namespace, owner_references)
            .await
        {
            Ok(top) => {
                if owner_references.iter().any(|r| r.controller == Some(true)) {
                    self.health.record_success(Component::KubernetesApi).await;
                }
                top
            }
            Err(e) => {
                warn!(
                    namespace = %namespace,
                    pod = %pod_name,
                    error = %e,
                    "Get root controller of pod failed, skip mutating pod"
                );
                self.metrics.inc_owner_resolution_failures(e.reason());
                if matches!(e, Error::OwnerLookup { .. }) {
                    self.health
                        .record_failure(Component::KubernetesApi, e.to_string())
                        .await;
                }
                return Some(allow);
            }
        };
        if top.is_empty() {
            debug!(namespace = %namespace, pod = %pod_name, "Pod has no controller, skip mutating pod");
            return Some(allow);
        }

        let key = ControllerKey::new(namespace.clone(), top.kind, top.name);
        let Some(recommendation) = self.recommendation_for(&key).await else {
            info!(controller = %key, pod = %pod_name, "No valid recommendation, skip mutating pod");
            return Some(allow);
        };

        let patch = build_resource_patch(&pod, &recommendation);
        if patch.0.is_empty() {
            debug!(controller = %key, pod = %pod_name, "Recommendation matches no container");
            return Some(allow);
        }

        let response = patched_or_allow(&request.uid, &patch);
        if response.patch.is_some() {
            self.logger.log_patch_applied(
                &namespace,
                &pod_name,
                &key.to_string(),
                patch.0.len(),
            );
            self.metrics.inc_patches_applied();
        }
        Some(response)
    }

    /// One time-valid recommendation for `key`, fetching at most once per
    /// miss and sharing the fetch with concurrent callers
    async fn recommendation_for(&self, key: &ControllerKey) -> Option<PodResourceRecommendation> {
        let entry = self.store.get_or_create(key);
        self.metrics.set_cache_entries(self.store.len() as i64);

        if let Some(recommendation) = entry.dispatch_one_valid(Utc::now()) {
            self.metrics.inc_cache_dispatch(true);
            return Some(recommendation);
        }

        match entry.begin_sync() {
            SyncRole::Owner(guard) => {
                debug!(
                    controller = %key,
                    previous_state = guard.previous_state().as_str(),
                    "Fetching new recommendations"
                );
                let started = Instant::now();
                let result = fetch_with_timeout(
                    self.source.as_ref(),
                    key,
                    Utc::now(),
                    self.config.fetch_timeout,
                )
                .await;
                self.metrics
                    .observe_fetch_latency(started.elapsed().as_secs_f64());

                match result {
                    Ok(recommendations) => {
                        debug!(controller = %key, count = recommendations.len(), "Fetched recommendations");
                        guard.complete(recommendations);
                        self.health
                            .record_success(Component::RecommendationSource)
                            .await;
                    }
                    Err(e) => {
                        // Waiters are released as the guard drops
                        drop(guard);
                        self.logger
                            .log_fetch_failure(&key.to_string(), e.reason(), &e.to_string());
                        self.metrics.inc_fetch_failures(e.reason());
                        self.health
                            .record_failure(Component::RecommendationSource, e.to_string())
                            .await;
                    }
                }
            }
            SyncRole::Waiter(waiter) => {
                debug!(controller = %key, "Waiting for in-flight recommendation fetch");
                waiter.wait().await;
            }
        }

        let recommendation = entry.dispatch_one_valid(Utc::now());
        self.metrics.inc_cache_dispatch(recommendation.is_some());
        recommendation
    }
}

/// Allow with `patch` attached, or plain allow when it cannot be encoded
fn patched_or_allow<P: Serialize>(uid: &str, patch: &P) -> AdmissionResponse {
    match serde_json::to_vec(patch) {
        Ok(bytes) => AdmissionResponse::allow_with_patch(uid, bytes),
        Err(e) => {
            warn!(uid = %uid, error = %e, "Marshal JSON patch failed, allow unmodified");
            AdmissionResponse::allow(uid)
        }
    }
}
