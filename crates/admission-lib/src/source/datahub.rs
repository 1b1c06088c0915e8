//! Datahub-backed recommendation source
//!
//! Queries `ListAvailablePodRecommendations` for the latest recommendation of
//! a controller and converts the result into [`PodResourceRecommendation`]s.

use super::RecommendationSource;
use crate::error::{Error, Result};
use crate::models::{
    ContainerResourceRecommendation, ControllerKey, PodResourceRecommendation, ResourceList,
    TopController,
};
use crate::proto::{
    query_condition::Order, ContainerRecommendation, DatahubServiceClient, Kind,
    ListPodRecommendationsRequest, ListPodRecommendationsResponse, MetricData, MetricType,
    ObjectMeta, PodRecommendation, QueryCondition, TimeRange,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, warn};

/// Datahub connection settings
#[derive(Debug, Clone)]
pub struct DatahubConfig {
    /// gRPC address, with or without scheme (e.g. "datahub.alameda.svc:50050")
    pub address: String,
    /// Cluster name sent in every object meta
    pub cluster_name: String,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for DatahubConfig {
    fn default() -> Self {
        Self {
            address: "datahub.alameda.svc:50050".to_string(),
            cluster_name: String::new(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// [`RecommendationSource`] talking to Datahub over gRPC
#[derive(Clone)]
pub struct DatahubRecommendationSource {
    client: DatahubServiceClient<Channel>,
    cluster_name: String,
}

impl DatahubRecommendationSource {
    /// Build a source whose channel connects on first use
    pub fn connect_lazy(config: &DatahubConfig) -> Result<Self> {
        let endpoint = Endpoint::from_shared(endpoint_uri(&config.address))?
            .connect_timeout(config.connect_timeout);
        let channel = endpoint.connect_lazy();

        Ok(Self {
            client: DatahubServiceClient::new(channel),
            cluster_name: config.cluster_name.clone(),
        })
    }

    /// Cluster name used in requests
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
}

#[async_trait]
impl RecommendationSource for DatahubRecommendationSource {
    async fn list_controller_recommendations(
        &self,
        key: &ControllerKey,
        query_time: DateTime<Utc>,
    ) -> Result<Vec<PodResourceRecommendation>> {
        let request = build_request(&self.cluster_name, key, query_time)?;
        debug!(controller = %key, request = ?request, "Query ListAvailablePodRecommendations to datahub");

        // Client handles are cheap clones over the shared channel
        let mut client = self.client.clone();
        let response = client
            .list_available_pod_recommendations(request)
            .await?
            .into_inner();
        debug!(
            controller = %key,
            count = response.pod_recommendations.len(),
            "Received ListAvailablePodRecommendations response"
        );

        recommendations_from_response(response)
    }
}

fn endpoint_uri(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

fn datahub_kind(kind: &str) -> Option<Kind> {
    match kind {
        "Deployment" => Some(Kind::Deployment),
        "DeploymentConfig" => Some(Kind::Deploymentconfig),
        "StatefulSet" => Some(Kind::Statefulset),
        _ => None,
    }
}

fn kubernetes_kind(kind: Kind) -> &'static str {
    match kind {
        Kind::Undefined => "Undefined",
        Kind::Deployment => "Deployment",
        Kind::Deploymentconfig => "DeploymentConfig",
        Kind::Statefulset => "StatefulSet",
    }
}

fn to_timestamp(time: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: time.timestamp(),
        nanos: time.timestamp_subsec_nanos() as i32,
    }
}

fn from_timestamp(timestamp: Option<&prost_types::Timestamp>) -> DateTime<Utc> {
    timestamp
        .and_then(|ts| DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32))
        .unwrap_or_default()
}

fn build_request(
    cluster_name: &str,
    key: &ControllerKey,
    query_time: DateTime<Utc>,
) -> Result<ListPodRecommendationsRequest> {
    let kind = datahub_kind(&key.kind).ok_or_else(|| Error::UnsupportedKind(key.kind.clone()))?;

    Ok(ListPodRecommendationsRequest {
        object_meta: vec![ObjectMeta {
            cluster_name: cluster_name.to_string(),
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            ..Default::default()
        }],
        kind: kind as i32,
        query_condition: Some(QueryCondition {
            time_range: Some(TimeRange {
                apply_time: Some(to_timestamp(query_time)),
                ..Default::default()
            }),
            order: Order::Desc as i32,
            limit: 1,
        }),
    })
}

fn recommendations_from_response(
    response: ListPodRecommendationsResponse,
) -> Result<Vec<PodResourceRecommendation>> {
    let status = response.status.ok_or_else(|| Error::SourceStatus {
        code: -1,
        message: "receive nil status from datahub".to_string(),
    })?;
    if status.code != 0 {
        return Err(Error::SourceStatus {
            code: status.code,
            message: status.message,
        });
    }

    Ok(response
        .pod_recommendations
        .iter()
        .map(pod_recommendation)
        .collect())
}

fn pod_recommendation(recommendation: &PodRecommendation) -> PodResourceRecommendation {
    let (namespace, name) = recommendation
        .object_meta
        .as_ref()
        .map(|meta| (meta.namespace.clone(), meta.name.clone()))
        .unwrap_or_default();

    let top_controller = recommendation
        .top_controller
        .as_ref()
        .map(|controller| TopController {
            kind: kubernetes_kind(controller.kind()).to_string(),
            name: controller
                .object_meta
                .as_ref()
                .map(|meta| meta.name.clone())
                .unwrap_or_default(),
        })
        .unwrap_or_default();

    PodResourceRecommendation {
        namespace,
        name,
        top_controller,
        container_recommendations: recommendation
            .container_recommendations
            .iter()
            .map(container_recommendation)
            .collect(),
        valid_start_time: from_timestamp(recommendation.start_time.as_ref()),
        valid_end_time: from_timestamp(recommendation.end_time.as_ref()),
    }
}

fn container_recommendation(
    recommendation: &ContainerRecommendation,
) -> ContainerResourceRecommendation {
    ContainerResourceRecommendation {
        name: recommendation.name.clone(),
        limits: resource_list(&recommendation.limit_recommendations),
        requests: resource_list(&recommendation.request_recommendations),
    }
}

/// First sample of each metric, converted to Kubernetes quantities
fn resource_list(metrics: &[MetricData]) -> ResourceList {
    let mut values: BTreeMap<i32, &str> = BTreeMap::new();
    for metric in metrics {
        if let Some(sample) = metric.data.first() {
            values.insert(metric.metric_type, sample.num_value.as_str());
        }
    }

    let mut resources = ResourceList::new();
    for (metric_type, value) in values {
        let resource_name = match MetricType::try_from(metric_type) {
            Ok(MetricType::CpuUsageSecondsPercentage) => "cpu",
            Ok(MetricType::MemoryUsageBytes) => "memory",
            _ => {
                warn!(
                    metric_type,
                    "No Kubernetes resource name for datahub metric type, skip this recommendation"
                );
                continue;
            }
        };

        let quantity = if resource_name == "cpu" {
            cpu_quantity(value)
        } else {
            memory_quantity(value)
        };
        match quantity {
            Some(quantity) => {
                resources.insert(resource_name.to_string(), quantity);
            }
            None => warn!(
                resource = resource_name,
                value = %value,
                "Parse value to Kubernetes quantity failed, skip this recommendation"
            ),
        }
    }
    resources
}

/// Millicores, rounded up
fn cpu_quantity(value: &str) -> Option<Quantity> {
    let millicores: f64 = value.trim().parse().ok()?;
    if !millicores.is_finite() || millicores < 0.0 {
        return None;
    }
    Some(Quantity(format!("{}m", millicores.ceil() as u64)))
}

fn memory_quantity(value: &str) -> Option<Quantity> {
    let value = value.trim();
    is_quantity(value).then(|| Quantity(value.to_string()))
}

/// Loose check of the Kubernetes quantity grammar: a decimal number followed
/// by an optional binary/decimal SI suffix or exponent
fn is_quantity(value: &str) -> bool {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let number_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_end);

    let digits = number.chars().filter(|c| c.is_ascii_digit()).count();
    if digits == 0 || number.matches('.').count() > 1 {
        return false;
    }

    match suffix {
        "" | "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" | "n" | "u" | "m" | "k" | "M" | "G"
        | "T" | "P" | "E" => true,
        exponent => exponent
            .strip_prefix(['e', 'E'])
            .map(|e| e.strip_prefix(['+', '-']).unwrap_or(e))
            .map(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false),
    }
}
