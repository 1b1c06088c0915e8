//! Pod admission: review wire types, JSON Patch construction and the
//! request orchestration tying cache, owner resolution and source together.

mod controller;
mod patch;

pub use controller::{AdmissionController, AdmissionControllerConfig};
pub use patch::{build_resource_patch, escape_pointer_token};

use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};

/// apiVersion answered when the request did not carry one
pub const DEFAULT_REVIEW_API_VERSION: &str = "admission.k8s.io/v1beta1";
pub const REVIEW_KIND: &str = "AdmissionReview";
pub const JSON_PATCH_TYPE: &str = "JSONPatch";

/// `admission.k8s.io` AdmissionReview, v1beta1 and v1 share this shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

impl AdmissionReview {
    /// Reply to a review sent with `api_version`, carrying `response`.
    ///
    /// A `None` response leaves the decision to the API server's failure
    /// policy.
    pub fn reply(api_version: Option<&str>, response: Option<AdmissionResponse>) -> Self {
        let api_version = match api_version {
            Some(v) if !v.is_empty() => v,
            _ => DEFAULT_REVIEW_API_VERSION,
        };
        Self {
            api_version: api_version.to_string(),
            kind: REVIEW_KIND.to_string(),
            request: None,
            response,
        }
    }
}

/// Group/version/kind as embedded in an admission request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

/// Group/version/resource as embedded in an admission request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub resource: String,
}

impl GroupVersionResource {
    /// Whether this is `core/v1 pods`
    pub fn is_core_v1_pods(&self) -> bool {
        self.group.is_empty() && self.version == "v1" && self.resource == "pods"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    #[serde(default)]
    pub kind: GroupVersionKind,
    #[serde(default)]
    pub resource: GroupVersionResource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    /// Base64-encoded on the wire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<ByteString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
}

impl AdmissionResponse {
    /// Allow without changes
    pub fn allow(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            allowed: true,
            patch: None,
            patch_type: None,
        }
    }

    /// Allow with a serialized JSON Patch
    pub fn allow_with_patch(uid: impl Into<String>, patch: Vec<u8>) -> Self {
        Self {
            uid: uid.into(),
            allowed: true,
            patch: Some(ByteString(patch)),
            patch_type: Some(JSON_PATCH_TYPE.to_string()),
        }
    }
}
