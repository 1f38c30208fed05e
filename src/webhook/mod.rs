//! Mutating admission webhook server
//!
//! Serves `POST /mutate` over TLS. Each request is decoded, handed to the
//! [`MutationPolicy`] and answered with an AdmissionReview; the only shared
//! state is the immutable policy built at startup.

pub mod handler;
pub mod review;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tracing::info;

use crate::mutation::MutationPolicy;
use crate::{Error, Result};

/// Largest AdmissionReview body accepted
///
/// UPDATE reviews carry both `object` and `oldObject`, each up to the
/// API server's ~1.5 MiB object limit.
pub const MAX_REVIEW_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Mutation policies, read-only for the life of the process
    pub policy: MutationPolicy,
}

impl WebhookState {
    /// Create a new webhook state around a policy
    pub fn new(policy: MutationPolicy) -> Self {
        Self { policy }
    }
}

/// Create the webhook router
///
/// - `POST /mutate` - AdmissionReview in, AdmissionReview out
/// - `GET /healthz` - liveness
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(handler::mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(MAX_REVIEW_BODY_BYTES))
        .with_state(state)
}

/// Listener configuration for the HTTPS server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind
    pub addr: SocketAddr,
    /// PEM certificate chain
    pub cert_file: PathBuf,
    /// PEM private key matching `cert_file`
    pub key_file: PathBuf,
}

/// Serve the webhook over TLS until `handle` is shut down
pub async fn serve(config: ServerConfig, state: Arc<WebhookState>, handle: Handle) -> Result<()> {
    let tls_config = RustlsConfig::from_pem_file(&config.cert_file, &config.key_file)
        .await
        .map_err(|e| {
            Error::tls(format!(
                "failed to load key pair {} / {}: {}",
                config.cert_file.display(),
                config.key_file.display(),
                e
            ))
        })?;

    info!(addr = %config.addr, "Starting admission webhook server");

    axum_server::bind_rustls(config.addr, tls_config)
        .handle(handle)
        .serve(webhook_router(state).into_make_service())
        .await
        .map_err(|e| Error::server(e.to_string()))
}

/// Wait for SIGINT or SIGTERM, then drain in-flight requests
pub async fn shutdown_on_signal(handle: Handle, grace: Duration) {
    wait_for_signal().await;
    info!(grace_secs = grace.as_secs(), "Got OS shutdown signal, shutting down webhook server gracefully");
    handle.graceful_shutdown(Some(grace));
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler, waiting for SIGINT only");
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

/// Resolve on SIGINT; never resolves if the handler cannot be installed
async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for SIGINT, shutdown only by SIGTERM or kill");
        std::future::pending::<()>().await;
    }
}
