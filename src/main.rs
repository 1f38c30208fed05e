//! Admission mutator - mutating admission webhook server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use admission_mutator::config::WebhookConfig;
use admission_mutator::mutation::MutationPolicy;
use admission_mutator::webhook::{self, ServerConfig, WebhookState};
use admission_mutator::{DEFAULT_SHUTDOWN_GRACE_SECS, DEFAULT_WEBHOOK_PORT};

/// Mutating admission webhook: Ingress TLS host normalization and Pod sidecar injection
#[derive(Parser, Debug)]
#[command(name = "admission-mutator", version, about, long_about = None)]
struct Cli {
    /// Webhook server port
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = DEFAULT_WEBHOOK_PORT)]
    port: u16,

    /// File containing the x509 certificate for HTTPS
    #[arg(
        long,
        env = "WEBHOOK_TLS_CERT_FILE",
        default_value = "/etc/webhook/certs/cert.pem"
    )]
    tls_cert_file: PathBuf,

    /// File containing the x509 private key matching --tls-cert-file
    #[arg(
        long,
        env = "WEBHOOK_TLS_KEY_FILE",
        default_value = "/etc/webhook/certs/key.pem"
    )]
    tls_key_file: PathBuf,

    /// DNS domain suffix for unqualified Ingress hosts
    ///
    /// Enables Ingress TLS host normalization.
    #[arg(long, env = "WEBHOOK_DNS_SUFFIX")]
    dns_suffix: Option<String>,

    /// Path to the sidecar injector configuration file
    ///
    /// Enables Pod sidecar injection.
    #[arg(long, env = "WEBHOOK_SIDECAR_CONFIG")]
    sidecar_config: Option<PathBuf>,

    /// Apply the single configured policy to every request regardless of kind
    #[arg(long, env = "WEBHOOK_UNCONDITIONAL")]
    unconditional: bool,

    /// Seconds allowed for in-flight requests to drain on shutdown
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE_SECS)]
    shutdown_grace_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = WebhookConfig::load(
        cli.dns_suffix.as_deref(),
        cli.sidecar_config.as_deref(),
        cli.unconditional,
    )
    .inspect_err(|e| tracing::error!(error = %e, "Invalid webhook configuration"))?;

    if let Some(suffix) = &config.dns_suffix {
        tracing::info!(dns_suffix = %suffix, "Ingress TLS host normalization enabled");
    }

    let policy = MutationPolicy::from_config(&config)
        .inspect_err(|e| tracing::error!(error = %e, "Invalid mutation policy"))?;
    let state = Arc::new(WebhookState::new(policy));

    let server = ServerConfig {
        addr: SocketAddr::from(([0, 0, 0, 0], cli.port)),
        cert_file: cli.tls_cert_file,
        key_file: cli.tls_key_file,
    };

    let handle = axum_server::Handle::new();
    tokio::spawn(webhook::shutdown_on_signal(
        handle.clone(),
        Duration::from_secs(cli.shutdown_grace_secs),
    ));

    webhook::serve(server, state, handle)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Webhook server failed"))?;

    tracing::info!("Webhook server stopped");
    Ok(())
}
