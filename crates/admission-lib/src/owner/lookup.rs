//! Owner lookups against the Kubernetes API

use super::OwnerLookup;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DynamicObject};
use kube::core::{ApiResource, GroupVersionKind};
use kube::{discovery, Client};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

type GvkKey = (String, String, String);

/// [`OwnerLookup`] backed by namespaced GETs of dynamic objects.
///
/// Workload kinds that usually own Pods are mapped to their REST resource
/// directly; anything else is resolved through API discovery once and cached.
pub struct KubeOwnerLookup {
    client: Client,
    discovered: Mutex<HashMap<GvkKey, ApiResource>>,
}

impl KubeOwnerLookup {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            discovered: Mutex::new(HashMap::new()),
        }
    }

    fn discovered(&self) -> MutexGuard<'_, HashMap<GvkKey, ApiResource>> {
        self.discovered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn api_resource(&self, namespace: &str, owner: &OwnerReference) -> Result<ApiResource> {
        let (group, version) = parse_api_version(&owner.api_version).ok_or_else(|| {
            Error::InvalidApiVersion {
                api_version: owner.api_version.clone(),
                kind: owner.kind.clone(),
                name: owner.name.clone(),
            }
        })?;
        let gvk = GroupVersionKind::gvk(group, version, &owner.kind);

        if let Some(plural) = well_known_plural(group, &owner.kind) {
            return Ok(ApiResource::from_gvk_with_plural(&gvk, plural));
        }

        let key = (group.to_string(), version.to_string(), owner.kind.clone());
        if let Some(resource) = self.discovered().get(&key) {
            return Ok(resource.clone());
        }

        debug!(
            api_version = %owner.api_version,
            kind = %owner.kind,
            "Discovering REST resource for owner kind"
        );
        let (resource, _) = discovery::pinned_kind(&self.client, &gvk)
            .await
            .map_err(|source| Error::OwnerLookup {
                namespace: namespace.to_string(),
                kind: owner.kind.clone(),
                name: owner.name.clone(),
                source,
            })?;
        self.discovered().insert(key, resource.clone());
        Ok(resource)
    }
}

#[async_trait]
impl OwnerLookup for KubeOwnerLookup {
    async fn owner_references(
        &self,
        namespace: &str,
        owner: &OwnerReference,
    ) -> Result<Vec<OwnerReference>> {
        let resource = self.api_resource(namespace, owner).await?;
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);

        let object = api
            .get(&owner.name)
            .await
            .map_err(|source| Error::OwnerLookup {
                namespace: namespace.to_string(),
                kind: owner.kind.clone(),
                name: owner.name.clone(),
                source,
            })?;

        Ok(object.metadata.owner_references.unwrap_or_default())
    }
}

/// Split `group/version` (or a bare core `version`) into its parts
fn parse_api_version(api_version: &str) -> Option<(&str, &str)> {
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    if version.is_empty() || version.contains('/') || (api_version.contains('/') && group.is_empty())
    {
        return None;
    }
    Some((group, version))
}

/// Plural resource name of kinds commonly found in Pod owner chains
fn well_known_plural(group: &str, kind: &str) -> Option<&'static str> {
    let plural = match (group, kind) {
        ("apps", "ReplicaSet") => "replicasets",
        ("apps", "Deployment") => "deployments",
        ("apps", "StatefulSet") => "statefulsets",
        ("apps", "DaemonSet") => "daemonsets",
        ("batch", "Job") => "jobs",
        ("batch", "CronJob") => "cronjobs",
        ("", "ReplicationController") => "replicationcontrollers",
        ("apps.openshift.io", "DeploymentConfig") => "deploymentconfigs",
        _ => return None,
    };
    Some(plural)
}
