//! Listeners: TLS admission webhook and plain-HTTP health/metrics API

use admission_lib::{
    server::{admission_router, api_router, AppState},
    AdmissionController,
};
use anyhow::Context;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Load the serving certificate and key; failure is fatal at startup
pub async fn load_tls(cert_file: &Path, key_file: &Path) -> anyhow::Result<RustlsConfig> {
    RustlsConfig::from_pem_file(cert_file, key_file)
        .await
        .with_context(|| {
            format!(
                "Failed to load TLS key pair from {:?} and {:?}",
                cert_file, key_file
            )
        })
}

/// Start the admission webhook server; `handle` reports when it is listening
pub async fn serve_admission(
    bind_address: String,
    tls: RustlsConfig,
    controller: Arc<AdmissionController>,
    handle: Handle,
) -> anyhow::Result<()> {
    let app = admission_router(controller);

    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("Invalid admission bind address {}", bind_address))?;
    info!(addr = %addr, "Starting admission webhook server");

    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

/// Start the API server
pub async fn serve_api(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = api_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
