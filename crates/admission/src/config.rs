//! Admission controller configuration
//!
//! Values come from an optional YAML/TOML file, then from environment
//! variables prefixed with `ADMCTL_`; nested keys use `__`, e.g.
//! `ADMCTL_DATAHUB__ADDRESS=datahub:50050`.

use admission_lib::{AdmissionControllerConfig, DatahubConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file read when `--config` is not given, if present
pub const DEFAULT_CONFIG_PATH: &str = "/etc/alameda/admission-controller/admission-controller.yml";

const ENV_PREFIX: &str = "ADMCTL";

/// Admission controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Answer reviews without a decision when false
    #[serde(default = "default_enable")]
    pub enable: bool,

    #[serde(default)]
    pub server: ServerConfig,

    /// Plain-HTTP port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub datahub: DatahubSettings,

    #[serde(default)]
    pub recommendation: RecommendationSettings,

    #[serde(default)]
    pub webhook: WebhookSettings,
}

/// TLS listener for admission reviews
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub tls_cert_file: PathBuf,
    pub tls_key_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatahubSettings {
    pub address: String,
    pub cluster_name: String,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecommendationSettings {
    /// Upper bound on a single upstream fetch
    pub fetch_timeout_secs: u64,
    /// Owner reference lookups before giving up on a Pod
    pub max_owner_hops: usize,
    /// Drop cache entries idle this long; unset keeps them forever
    pub cache_idle_ttl_secs: Option<u64>,
    pub cache_sweep_interval_secs: u64,
}

/// MutatingWebhookConfiguration registered at startup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub register: bool,
    pub name: String,
    pub service_name: String,
    pub service_namespace: String,
    pub service_port: i32,
    pub path: String,
    pub ca_bundle_file: PathBuf,
    pub failure_policy: String,
    pub timeout_seconds: i32,
}

fn default_enable() -> bool {
    true
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:443".to_string(),
            tls_cert_file: PathBuf::from("/etc/alameda/admission-controller/tls/tls.crt"),
            tls_key_file: PathBuf::from("/etc/alameda/admission-controller/tls/tls.key"),
        }
    }
}

impl Default for DatahubSettings {
    fn default() -> Self {
        Self {
            address: "datahub.alameda.svc:50050".to_string(),
            cluster_name: String::new(),
            connect_timeout_secs: 5,
        }
    }
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            max_owner_hops: 10,
            cache_idle_ttl_secs: None,
            cache_sweep_interval_secs: 60,
        }
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            register: true,
            name: "alameda-admission-controller".to_string(),
            service_name: "admission-controller".to_string(),
            service_namespace: "alameda".to_string(),
            service_port: 443,
            path: "/pods".to_string(),
            ca_bundle_file: PathBuf::from("/etc/alameda/admission-controller/tls/ca.crt"),
            failure_policy: "Ignore".to_string(),
            timeout_seconds: 15,
        }
    }
}

impl AdmissionConfig {
    /// Load configuration from `path` (or the default file when it exists)
    /// and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder
                .add_source(config::File::with_name(DEFAULT_CONFIG_PATH).required(false)),
        };

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read admission controller configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse admission controller configuration")
    }

    pub fn controller_config(&self) -> AdmissionControllerConfig {
        AdmissionControllerConfig {
            enable: self.enable,
            fetch_timeout: Duration::from_secs(self.recommendation.fetch_timeout_secs),
        }
    }

    pub fn datahub_config(&self) -> DatahubConfig {
        DatahubConfig {
            address: self.datahub.address.clone(),
            cluster_name: self.datahub.cluster_name.clone(),
            connect_timeout: Duration::from_secs(self.datahub.connect_timeout_secs),
        }
    }

    /// Idle TTL and sweep period of the cache sweeper, if enabled
    pub fn cache_eviction(&self) -> Option<(Duration, Duration)> {
        self.recommendation.cache_idle_ttl_secs.map(|ttl| {
            (
                Duration::from_secs(ttl),
                Duration::from_secs(self.recommendation.cache_sweep_interval_secs.max(1)),
            )
        })
    }
}
