//! Upstream recommendation sources
//!
//! A source answers "which recommendations apply to this controller at this
//! time". Only the task that owns a cache entry's sync round calls it, and
//! always through [`fetch_with_timeout`].

mod datahub;

pub use datahub::{DatahubConfig, DatahubRecommendationSource};

use crate::error::{Error, Result};
use crate::models::{ControllerKey, PodResourceRecommendation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default upper bound on a single upstream fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider of time-windowed Pod resource recommendations
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    /// Recommendations for the controller identified by `key` that are
    /// applicable around `query_time`, most recent first
    async fn list_controller_recommendations(
        &self,
        key: &ControllerKey,
        query_time: DateTime<Utc>,
    ) -> Result<Vec<PodResourceRecommendation>>;
}

/// Run a fetch bounded by `timeout`.
///
/// On expiry the in-flight call is dropped, which cancels it.
pub async fn fetch_with_timeout(
    source: &dyn RecommendationSource,
    key: &ControllerKey,
    query_time: DateTime<Utc>,
    timeout: Duration,
) -> Result<Vec<PodResourceRecommendation>> {
    match tokio::time::timeout(timeout, source.list_controller_recommendations(key, query_time))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(Error::FetchTimeout(timeout)),
    }
}
