//! Owner reference chain resolution
//!
//! Walks a Pod's `ownerReferences` upward, following the reference flagged
//! `controller: true` at each level, until an object without a controlling
//! owner is reached. That object is the workload controller recommendations
//! are keyed by.

mod lookup;

pub use lookup::KubeOwnerLookup;

use crate::error::{Error, Result};
use crate::models::TopController;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::sync::Arc;
use tracing::debug;

/// Default number of owner lookups before the walk is abandoned
pub const DEFAULT_MAX_OWNER_HOPS: usize = 10;

/// Fetches the owner references of a referenced object
#[async_trait]
pub trait OwnerLookup: Send + Sync {
    /// Owner references of the object `owner` points at, in `namespace`
    async fn owner_references(
        &self,
        namespace: &str,
        owner: &OwnerReference,
    ) -> Result<Vec<OwnerReference>>;
}

/// Resolves the topmost controller of an object
#[derive(Clone)]
pub struct OwnerChainResolver {
    lookup: Arc<dyn OwnerLookup>,
    max_hops: usize,
}

impl OwnerChainResolver {
    pub fn new(lookup: Arc<dyn OwnerLookup>) -> Self {
        Self {
            lookup,
            max_hops: DEFAULT_MAX_OWNER_HOPS,
        }
    }

    /// Override the hop limit
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Kind and name of the topmost controller reachable from
    /// `owner_references`.
    ///
    /// Returns an empty [`TopController`] when none of the references is a
    /// controller.
    pub async fn resolve_root_controller(
        &self,
        namespace: &str,
        owner_references: &[OwnerReference],
    ) -> Result<TopController> {
        let mut current = owner_references.to_vec();
        let mut resolved = TopController::default();
        let mut hops = 0;

        while let Some(controller) = controlling_owner(&current) {
            if hops >= self.max_hops {
                return Err(Error::OwnerChainTooDeep {
                    namespace: namespace.to_string(),
                    limit: self.max_hops,
                });
            }
            hops += 1;

            debug!(
                namespace = %namespace,
                kind = %controller.kind,
                name = %controller.name,
                "Following controller owner reference"
            );
            resolved = TopController {
                kind: controller.kind.clone(),
                name: controller.name.clone(),
            };
            current = self.lookup.owner_references(namespace, controller).await?;
        }

        Ok(resolved)
    }
}

fn controlling_owner(references: &[OwnerReference]) -> Option<&OwnerReference> {
    references.iter().find(|r| r.controller == Some(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn owner_ref(api_version: &str, kind: &str, name: &str, controller: bool) -> OwnerReference {
        OwnerReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: format!("uid-{}", name),
            controller: Some(controller),
            block_owner_deletion: None,
        }
    }

    /// In-memory object graph keyed by (kind, name)
    #[derive(Default)]
    struct MockOwnerLookup {
        owners: HashMap<(String, String), Vec<OwnerReference>>,
        calls: AtomicUsize,
    }

    impl MockOwnerLookup {
        fn with_owners(mut self, kind: &str, name: &str, owners: Vec<OwnerReference>) -> Self {
            self.owners
                .insert((kind.to_string(), name.to_string()), owners);
            self
        }
    }

    #[async_trait]
    impl OwnerLookup for MockOwnerLookup {
        async fn owner_references(
            &self,
            namespace: &str,
            owner: &OwnerReference,
        ) -> Result<Vec<OwnerReference>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.owners
                .get(&(owner.kind.clone(), owner.name.clone()))
                .cloned()
                .ok_or_else(|| Error::OwnerLookup {
                    namespace: namespace.to_string(),
                    kind: owner.kind.clone(),
                    name: owner.name.clone(),
                    source: kube::Error::Api(ErrorResponse {
                        status: "Failure".to_string(),
                        message: format!("{} not found", owner.name),
                        reason: "NotFound".to_string(),
                        code: 404,
                    }),
                })
        }
    }

    #[tokio::test]
    async fn test_resolves_deployment_through_replicaset() {
        let lookup = Arc::new(
            MockOwnerLookup::default()
                .with_owners(
                    "ReplicaSet",
                    "rs1",
                    vec![owner_ref("apps/v1", "Deployment", "foo", true)],
                )
                .with_owners("Deployment", "foo", vec![]),
        );
        let resolver = OwnerChainResolver::new(lookup.clone());

        let pod_owners = vec![owner_ref("apps/v1", "ReplicaSet", "rs1", true)];
        let top = resolver
            .resolve_root_controller("ns1", &pod_owners)
            .await
            .unwrap();

        assert_eq!(top.kind, "Deployment");
        assert_eq!(top.name, "foo");
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_controller_owner_returns_empty() {
        let lookup = Arc::new(MockOwnerLookup::default());
        let resolver = OwnerChainResolver::new(lookup.clone());

        let top = resolver.resolve_root_controller("ns1", &[]).await.unwrap();
        assert!(top.is_empty());

        // Non-controller owners are not followed
        let owners = vec![owner_ref("v1", "ConfigMap", "cm", false)];
        let top = resolver
            .resolve_root_controller("ns1", &owners)
            .await
            .unwrap();
        assert_eq!(top, TopController::default());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_only_controller_reference_is_followed() {
        let lookup = Arc::new(
            MockOwnerLookup::default().with_owners(
                "StatefulSet",
                "db",
                vec![owner_ref("v1", "ConfigMap", "not-a-controller", false)],
            ),
        );
        let resolver = OwnerChainResolver::new(lookup);

        let owners = vec![
            owner_ref("v1", "ConfigMap", "settings", false),
            owner_ref("apps/v1", "StatefulSet", "db", true),
        ];
        let top = resolver
            .resolve_root_controller("ns1", &owners)
            .await
            .unwrap();

        assert_eq!(top.kind, "StatefulSet");
        assert_eq!(top.name, "db");
    }

    #[tokio::test]
    async fn test_ownership_cycle_hits_hop_limit() {
        let lookup = Arc::new(
            MockOwnerLookup::default()
                .with_owners(
                    "ReplicaSet",
                    "a",
                    vec![owner_ref("apps/v1", "ReplicaSet", "b", true)],
                )
                .with_owners(
                    "ReplicaSet",
                    "b",
                    vec![owner_ref("apps/v1", "ReplicaSet", "a", true)],
                ),
        );
        let resolver = OwnerChainResolver::new(lookup.clone()).with_max_hops(4);

        let owners = vec![owner_ref("apps/v1", "ReplicaSet", "a", true)];
        let err = resolver
            .resolve_root_controller("ns1", &owners)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::OwnerChainTooDeep { limit: 4, .. }));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_lookup_error_propagates() {
        let lookup = Arc::new(MockOwnerLookup::default());
        let resolver = OwnerChainResolver::new(lookup);

        let owners = vec![owner_ref("apps/v1", "ReplicaSet", "gone", true)];
        let err = resolver
            .resolve_root_controller("ns1", &owners)
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "owner_lookup");
        assert!(err.to_string().contains("ns1/gone"));
    }
}
