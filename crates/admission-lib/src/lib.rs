//! Pod resource admission library
//!
//! This crate provides the core functionality for:
//! - Resolving a Pod's root workload controller through owner references
//! - Caching time-windowed resource recommendations per controller
//! - Single-flight fetching from the upstream recommendation source
//! - Building JSON Patches for container resources
//! - Health checks and observability

pub mod admission;
pub mod cache;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod owner;
pub mod proto;
pub mod server;
pub mod source;

pub use admission::{AdmissionController, AdmissionControllerConfig, AdmissionReview};
pub use cache::RecommendationStore;
pub use error::{Error, Result};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AdmissionMetrics, StructuredLogger};
pub use owner::{KubeOwnerLookup, OwnerChainResolver, OwnerLookup};
pub use source::{DatahubConfig, DatahubRecommendationSource, RecommendationSource};
