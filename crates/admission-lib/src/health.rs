//! Health of the admission path
//!
//! `/healthz` reports every component; `/readyz` turns true once the TLS
//! webhook listener accepts reviews and stays true while the Kubernetes API
//! answers owner lookups. A failing recommendation source only degrades the
//! service: Pods keep being admitted, unmodified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Consecutive failed owner lookups after which the Kubernetes API counts as down
pub const KUBERNETES_API_FAILURE_THRESHOLD: u32 = 5;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Parts of the admission path tracked by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    /// TLS listener serving `/pods`
    AdmissionServer,
    /// Upstream recommendation source (Datahub)
    RecommendationSource,
    /// API server used for owner lookups
    KubernetesApi,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::AdmissionServer,
        Component::RecommendationSource,
        Component::KubernetesApi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::AdmissionServer => "admission_server",
            Component::RecommendationSource => "recommendation_source",
            Component::KubernetesApi => "kubernetes_api",
        }
    }

    /// Failures of the recommendation source never take the webhook out of
    /// service; the other components do once they turn unhealthy.
    fn gates_readiness(self) -> bool {
        !matches!(self, Component::RecommendationSource)
    }

    fn status_after_failures(self, consecutive_failures: u32) -> ComponentStatus {
        match self {
            Component::KubernetesApi if consecutive_failures >= KUBERNETES_API_FAILURE_THRESHOLD => {
                ComponentStatus::Unhealthy
            }
            Component::AdmissionServer => ComponentStatus::Unhealthy,
            _ => ComponentStatus::Degraded,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub consecutive_failures: u32,
    /// Time of the last status change
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            consecutive_failures: 0,
            since: Utc::now(),
        }
    }

    fn transition(&mut self, status: ComponentStatus, message: Option<String>) {
        if self.status != status {
            self.since = Utc::now();
        }
        self.status = status;
        self.message = message;
    }
}

/// `/healthz` body
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    /// Address the webhook listener is bound to, once listening
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_address: Option<SocketAddr>,
    pub components: BTreeMap<&'static str, ComponentHealth>,
}

/// `/readyz` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct State {
    components: BTreeMap<Component, ComponentHealth>,
    listener: Option<SocketAddr>,
}

/// Shared view of admission health, cloned into the controller and the API
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// All components registered; the webhook listener starts out not listening
    pub fn new() -> Self {
        let components = Component::ALL
            .into_iter()
            .map(|component| {
                let health = match component {
                    Component::AdmissionServer => ComponentHealth::new(
                        ComponentStatus::Degraded,
                        Some("TLS listener not started".to_string()),
                    ),
                    _ => ComponentHealth::new(ComponentStatus::Healthy, None),
                };
                (component, health)
            })
            .collect();

        Self {
            state: Arc::new(RwLock::new(State {
                components,
                listener: None,
            })),
        }
    }

    /// The webhook listener is bound and accepting reviews
    pub async fn mark_listening(&self, addr: SocketAddr) {
        let mut state = self.state.write().await;
        state.listener = Some(addr);
        if let Some(health) = state.components.get_mut(&Component::AdmissionServer) {
            health.consecutive_failures = 0;
            health.transition(ComponentStatus::Healthy, None);
        }
        info!(addr = %addr, "Admission webhook listener is accepting reviews");
    }

    /// The webhook listener went away; readiness is withdrawn
    pub async fn mark_listener_stopped(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.write().await;
        state.listener = None;
        if let Some(health) = state.components.get_mut(&Component::AdmissionServer) {
            health.consecutive_failures += 1;
            health.transition(ComponentStatus::Unhealthy, Some(reason.clone()));
        }
        warn!(reason = %reason, "Admission webhook listener stopped");
    }

    /// A call through `component` succeeded
    pub async fn record_success(&self, component: Component) {
        {
            let state = self.state.read().await;
            if state
                .components
                .get(&component)
                .map(|h| h.status == ComponentStatus::Healthy && h.consecutive_failures == 0)
                .unwrap_or(false)
            {
                return;
            }
        }

        let mut state = self.state.write().await;
        if let Some(health) = state.components.get_mut(&component) {
            if health.status != ComponentStatus::Healthy {
                info!(
                    component = %component,
                    after_failures = health.consecutive_failures,
                    "Component recovered"
                );
            }
            health.consecutive_failures = 0;
            health.transition(ComponentStatus::Healthy, None);
        }
    }

    /// A call through `component` failed; returns the resulting status
    pub async fn record_failure(
        &self,
        component: Component,
        message: impl Into<String>,
    ) -> ComponentStatus {
        let mut state = self.state.write().await;
        let Some(health) = state.components.get_mut(&component) else {
            return ComponentStatus::Healthy;
        };

        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        let status = component.status_after_failures(health.consecutive_failures);
        if status != health.status {
            warn!(
                component = %component,
                status = ?status,
                consecutive_failures = health.consecutive_failures,
                "Component health changed"
            );
        }
        health.transition(status, Some(message.into()));
        status
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            listen_address: state.listener,
            components: state
                .components
                .iter()
                .map(|(component, health)| (component.as_str(), health.clone()))
                .collect(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        if state.listener.is_none() {
            return ReadinessResponse {
                ready: false,
                reason: Some("Admission webhook listener is not accepting reviews".to_string()),
            };
        }

        let blocking = state.components.iter().find(|(component, health)| {
            component.gates_readiness() && health.status == ComponentStatus::Unhealthy
        });
        match blocking {
            Some((component, health)) => ReadinessResponse {
                ready: false,
                reason: Some(match &health.message {
                    Some(message) => format!("{} unhealthy: {}", component, message),
                    None => format!("{} unhealthy", component),
                }),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listen_addr() -> SocketAddr {
        "0.0.0.0:8443".parse().unwrap()
    }

    #[tokio::test]
    async fn test_not_ready_until_webhook_listens() {
        let registry = HealthRegistry::new();

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains("listener"));

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.listen_address.is_none());
        assert_eq!(
            health.components["admission_server"].status,
            ComponentStatus::Degraded
        );

        registry.mark_listening(listen_addr()).await;

        assert!(registry.readiness().await.ready);
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.listen_address, Some(listen_addr()));
    }

    #[tokio::test]
    async fn test_source_failures_degrade_but_keep_ready() {
        let registry = HealthRegistry::new();
        registry.mark_listening(listen_addr()).await;

        for _ in 0..20 {
            let status = registry
                .record_failure(Component::RecommendationSource, "timeout after 10 seconds")
                .await;
            assert_eq!(status, ComponentStatus::Degraded);
        }

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        let source = &health.components["recommendation_source"];
        assert_eq!(source.consecutive_failures, 20);
        assert_eq!(source.message.as_deref(), Some("timeout after 10 seconds"));
        assert!(registry.readiness().await.ready);

        registry
            .record_success(Component::RecommendationSource)
            .await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components["recommendation_source"].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_kubernetes_api_withdraws_readiness_after_repeated_failures() {
        let registry = HealthRegistry::new();
        registry.mark_listening(listen_addr()).await;

        for _ in 1..KUBERNETES_API_FAILURE_THRESHOLD {
            let status = registry
                .record_failure(Component::KubernetesApi, "connection refused")
                .await;
            assert_eq!(status, ComponentStatus::Degraded);
            assert!(registry.readiness().await.ready);
        }

        let status = registry
            .record_failure(Component::KubernetesApi, "connection refused")
            .await;
        assert_eq!(status, ComponentStatus::Unhealthy);

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("kubernetes_api unhealthy: connection refused")
        );

        // One successful lookup puts the webhook back in service
        registry.record_success(Component::KubernetesApi).await;
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_stopped_listener_is_unhealthy() {
        let registry = HealthRegistry::new();
        registry.mark_listening(listen_addr()).await;

        registry.mark_listener_stopped("Webhook server stopped").await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(health.listen_address.is_none());
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_status_change_moves_since() {
        let registry = HealthRegistry::new();
        let before = registry.health().await.components["kubernetes_api"].since;

        registry
            .record_failure(Component::KubernetesApi, "connection refused")
            .await;
        let first = registry.health().await.components["kubernetes_api"].clone();
        assert!(first.since >= before);

        // Still degraded: the transition time stays put
        registry
            .record_failure(Component::KubernetesApi, "connection refused")
            .await;
        let second = registry.health().await.components["kubernetes_api"].clone();
        assert_eq!(second.since, first.since);
        assert_eq!(second.consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_health_serializes_component_names() {
        let registry = HealthRegistry::new();
        registry.mark_listening(listen_addr()).await;

        let value = serde_json::to_value(registry.health().await).unwrap();

        assert_eq!(value["status"], "healthy");
        assert_eq!(value["listen_address"], "0.0.0.0:8443");
        for component in Component::ALL {
            assert_eq!(value["components"][component.as_str()]["status"], "healthy");
        }
    }
}
