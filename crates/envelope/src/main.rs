//! `envelope-svc`: HTTP service entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (OTEL + tracing).
//! 3. Build the configured [`KeyProvider`].
//! 4. Parse the embedded API documentation.
//! 5. Build the Axum router and serve until Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use envelope::config::{Config, KeyProviderKind};
use envelope::server::{docs::ApiDocs, router, state::AppState};
use envelope::{AwsKmsProvider, EnvelopeEncryptor, KeyProvider, LocalKeyProvider};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    envelope::telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "envelope-svc starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key provider
    // -----------------------------------------------------------------------
    let provider: Arc<dyn KeyProvider> = match cfg.key_provider {
        KeyProviderKind::AwsKms => Arc::new(
            AwsKmsProvider::from_env(cfg.kms_endpoint_url.as_deref(), cfg.kms_enabled).await?,
        ),
        KeyProviderKind::Local => {
            warn!("using local key provider; not for production data");
            Arc::new(
                LocalKeyProvider::new()
                    .with_key(cfg.local_key_id.clone(), cfg.local_master_key()?)?
                    .enabled(cfg.kms_enabled),
            )
        }
    };
    info!(
        provider = provider.name(),
        enabled = provider.is_enabled(),
        "key provider ready"
    );

    // -----------------------------------------------------------------------
    // 4. API documentation
    // -----------------------------------------------------------------------
    let docs = ApiDocs::load()?;

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let default_key_id = match cfg.key_provider {
        KeyProviderKind::Local => cfg.default_key_id.clone().or(Some(cfg.local_key_id.clone())),
        KeyProviderKind::AwsKms => cfg.default_key_id.clone(),
    };
    let state = AppState::new(
        EnvelopeEncryptor::new(provider),
        default_key_id,
        docs,
        cfg.max_request_bytes,
    );
    let router = router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("envelope-svc stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
