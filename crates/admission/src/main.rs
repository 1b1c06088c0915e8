//! Admission Controller - Pod resource mutating webhook
//!
//! Receives Pod CREATE reviews from the API server, resolves each Pod's
//! top-level workload controller and patches container resources from
//! the controller's cached recommendations.

use admission_lib::{
    cache::run_idle_sweeper,
    health::{Component, HealthRegistry},
    observability::StructuredLogger,
    server::AppState,
    AdmissionController, DatahubRecommendationSource, KubeOwnerLookup, OwnerChainResolver,
    RecommendationStore,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod webhook;

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pod resource mutating admission webhook
#[derive(Debug, Parser)]
#[command(name = "admission-controller", version, about)]
struct Cli {
    /// Configuration file; defaults to the in-cluster path when present
    #[arg(long, env = "ADMCTL_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting admission-controller");

    let cli = Cli::parse();
    let config = config::AdmissionConfig::load(cli.config.as_deref())?;
    info!(
        datahub = %config.datahub.address,
        bind_address = %config.server.bind_address,
        "Admission controller configured"
    );

    // Not ready until the webhook listener is bound
    let health_registry = HealthRegistry::new();

    let instance = std::env::var("HOSTNAME").unwrap_or_else(|_| "admission-controller".to_string());
    let logger = StructuredLogger::new(instance);

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    if config.webhook.register {
        webhook::register(client.clone(), &config.webhook).await?;
        logger.log_webhook_registered(&config.webhook.name, &config.webhook.service_name);
        health_registry.record_success(Component::KubernetesApi).await;
    }

    let source = DatahubRecommendationSource::connect_lazy(&config.datahub_config())
        .context("Failed to configure Datahub client")?;

    let resolver = OwnerChainResolver::new(Arc::new(KubeOwnerLookup::new(client)))
        .with_max_hops(config.recommendation.max_owner_hops);

    let store = Arc::new(RecommendationStore::new());
    if let Some((max_idle, period)) = config.cache_eviction() {
        tokio::spawn(run_idle_sweeper(Arc::clone(&store), max_idle, period));
    }

    let controller = Arc::new(
        AdmissionController::new(
            config.controller_config(),
            store,
            resolver,
            Arc::new(source),
            health_registry.clone(),
        )
        .with_logger(logger.clone()),
    );

    let tls = api::load_tls(&config.server.tls_cert_file, &config.server.tls_key_file).await?;

    let app_state = Arc::new(AppState::new(health_registry.clone()));
    let api_handle = tokio::spawn(api::serve_api(config.api_port, app_state));

    let listener = axum_server::Handle::new();
    let mut admission_handle = tokio::spawn(api::serve_admission(
        config.server.bind_address.clone(),
        tls,
        controller,
        listener.clone(),
    ));
    {
        let health_registry = health_registry.clone();
        tokio::spawn(async move {
            if let Some(addr) = listener.listening().await {
                health_registry.mark_listening(addr).await;
            }
        });
    }

    logger.log_startup(CONTROLLER_VERSION, config.enable);

    // Wait for shutdown signal or the webhook server going away
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut admission_handle => {
            health_registry
                .mark_listener_stopped("Webhook server stopped")
                .await;
            match result {
                Ok(Ok(())) => logger.log_shutdown("Webhook server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "Admission webhook server failed");
                    return Err(e);
                }
                Err(e) => return Err(e).context("Admission webhook server task panicked"),
            }
        }
    }

    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
