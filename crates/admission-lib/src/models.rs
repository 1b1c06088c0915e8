//! Core data models for the admission controller

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Resource name -> quantity, as in a container's `resources.limits`
pub type ResourceList = BTreeMap<String, Quantity>;

/// Identifies a workload controller whose recommendations are cached
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControllerKey {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

impl ControllerKey {
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ControllerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.namespace, self.kind, self.name)
    }
}

/// Kind and name of the topmost controller a recommendation was computed for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopController {
    pub kind: String,
    pub name: String,
}

impl TopController {
    /// True when no controller was found
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.name.is_empty()
    }
}

/// Recommended limits and requests for a single container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerResourceRecommendation {
    pub name: String,
    #[serde(default)]
    pub limits: ResourceList,
    #[serde(default)]
    pub requests: ResourceList,
}

/// Time-windowed resource recommendation for one Pod of a controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodResourceRecommendation {
    pub namespace: String,
    pub name: String,
    pub top_controller: TopController,
    pub container_recommendations: Vec<ContainerResourceRecommendation>,
    pub valid_start_time: DateTime<Utc>,
    pub valid_end_time: DateTime<Utc>,
}

impl PodResourceRecommendation {
    /// Whether `at` falls inside the closed validity window
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_start_time <= at && at <= self.valid_end_time
    }

    /// Recommendation for the container with the given name, if any
    pub fn container(&self, name: &str) -> Option<&ContainerResourceRecommendation> {
        self.container_recommendations
            .iter()
            .find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn recommendation(start: DateTime<Utc>, end: DateTime<Utc>) -> PodResourceRecommendation {
        PodResourceRecommendation {
            namespace: "ns1".to_string(),
            name: "foo-abc".to_string(),
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

    #[test]
    fn test_controller_key_display() {
        let key = ControllerKey::new("ns1", "Deployment", "foo");
        assert_eq!(key.to_string(), "ns1.Deployment.foo");
    }

    #[test]
    fn test_validity_window_is_inclusive() {
        let now = Utc::now();
        let rec = recommendation(now, now + Duration::minutes(5));

        assert!(rec.is_valid_at(now));
        assert!(rec.is_valid_at(now + Duration::minutes(5)));
        assert!(!rec.is_valid_at(now - Duration::seconds(1)));
        assert!(!rec.is_valid_at(now + Duration::minutes(6)));
    }

    #[test]
    fn test_container_lookup() {
        let now = Utc::now();
        let rec = recommendation(now, now);
        assert!(rec.container("app").is_some());
        assert!(rec.container("sidecar").is_none());
    }
}
