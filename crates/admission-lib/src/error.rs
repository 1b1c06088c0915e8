//! Error types for the admission controller
//!
//! None of these ever reach the API server as a denial. The request path logs
//! them and answers "allowed, unmodified"; only startup treats them as fatal.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for admission operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error while tracing owner references
    #[error("get owner references of {kind} {namespace}/{name} failed: {source}")]
    OwnerLookup {
        namespace: String,
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    /// Owner reference carries an apiVersion that cannot be parsed
    #[error("invalid apiVersion {api_version:?} in owner reference {kind}/{name}")]
    InvalidApiVersion {
        api_version: String,
        kind: String,
        name: String,
    },

    /// Owner chain longer than the configured hop limit (likely a cycle)
    #[error("owner reference chain in namespace {namespace} exceeds {limit} hops")]
    OwnerChainTooDeep { namespace: String, limit: usize },

    /// Upstream fetch did not complete in time
    #[error("fetch recommendations failed: timeout after {} seconds", .0.as_secs_f64())]
    FetchTimeout(Duration),

    /// Controller kind has no mapping in the upstream source
    #[error("no mapping upstream kind for controller kind: {0}")]
    UnsupportedKind(String),

    /// gRPC transport error
    #[error("recommendation source transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// gRPC call returned a non-OK status
    #[error("recommendation source rpc failed: {0}")]
    Rpc(#[from] tonic::Status),

    /// Upstream answered but reported a failure in its payload
    #[error("recommendation source returned status code {code}: {message}")]
    SourceStatus { code: i32, message: String },

    /// Admission request could not be decoded
    #[error("decode admission request failed: {0}")]
    Decode(String),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Short, low-cardinality label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Error::OwnerLookup { .. } => "owner_lookup",
            Error::InvalidApiVersion { .. } => "invalid_api_version",
            Error::OwnerChainTooDeep { .. } => "owner_chain_too_deep",
            Error::FetchTimeout(_) => "timeout",
            Error::UnsupportedKind(_) => "unsupported_kind",
            Error::Transport(_) => "transport",
            Error::Rpc(_) => "rpc",
            Error::SourceStatus { .. } => "source_status",
            Error::Decode(_) => "decode",
            Error::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_reports_seconds() {
        let err = Error::FetchTimeout(Duration::from_secs(10));
        assert_eq!(
            err.to_string(),
            "fetch recommendations failed: timeout after 10 seconds"
        );
        assert_eq!(err.reason(), "timeout");
    }

    #[test]
    fn hop_limit_message_names_namespace() {
        let err = Error::OwnerChainTooDeep {
            namespace: "ns1".to_string(),
            limit: 10,
        };
        assert!(err.to_string().contains("ns1"));
        assert!(err.to_string().contains("10 hops"));
    }
}
