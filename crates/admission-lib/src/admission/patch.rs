//! JSON Patch (RFC 6902) construction for container resources

use crate::models::{PodResourceRecommendation, ResourceList};
use json_patch::{AddOperation, Patch, PatchOperation, ReplaceOperation};
use k8s_openapi::api::core::v1::{Container, Pod};
use serde_json::{Map, Value};

/// Escape a JSON Pointer reference token (`~` -> `~0`, `/` -> `~1`)
pub fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Patch setting every matched container's limits and requests to the
/// recommended values.
///
/// Existing entries are replaced and missing ones added, creating the
/// `resources`, `limits` or `requests` objects when absent. Containers
/// without a recommendation are left alone.
pub fn build_resource_patch(pod: &Pod, recommendation: &PodResourceRecommendation) -> Patch {
    let mut operations = Vec::new();
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();

    for (index, container) in containers.iter().enumerate() {
        let Some(recommended) = recommendation.container(&container.name) else {
            continue;
        };
        container_operations(
            &mut operations,
            index,
            container,
            &recommended.limits,
            &recommended.requests,
        );
    }

    Patch(operations)
}

fn container_operations(
    operations: &mut Vec<PatchOperation>,
    index: usize,
    container: &Container,
    limits: &ResourceList,
    requests: &ResourceList,
) {
    let resources_path = format!("/spec/containers/{}/resources", index);

    let Some(resources) = container.resources.as_ref() else {
        let mut value = Map::new();
        if !limits.is_empty() {
            value.insert("limits".to_string(), resource_map(limits));
        }
        if !requests.is_empty() {
            value.insert("requests".to_string(), resource_map(requests));
        }
        if !value.is_empty() {
            operations.push(add(resources_path, Value::Object(value)));
        }
        return;
    };

    for (field, recommended, current) in [
        ("limits", limits, resources.limits.as_ref()),
        ("requests", requests, resources.requests.as_ref()),
    ] {
        if recommended.is_empty() {
            continue;
        }
        let field_path = format!("{}/{}", resources_path, field);

        let Some(current) = current else {
            operations.push(add(field_path, resource_map(recommended)));
            continue;
        };

        for (name, quantity) in recommended {
            let path = format!("{}/{}", field_path, escape_pointer_token(name));
            let value = Value::String(quantity.0.clone());
            if current.contains_key(name) {
                operations.push(PatchOperation::Replace(ReplaceOperation { path, value }));
            } else {
                operations.push(add(path, value));
            }
        }
    }
}

fn add(path: String, value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation { path, value })
}

fn resource_map(resources: &ResourceList) -> Value {
    Value::Object(
        resources
            .iter()
            .map(|(name, quantity)| (name.clone(), Value::String(quantity.0.clone())))
            .collect(),
    )
}
