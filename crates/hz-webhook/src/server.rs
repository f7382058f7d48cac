//! HTTPS listener for the admission endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use crate::{webhook_router, WebhookError, WebhookState};

/// Webhook server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind
    pub addr: SocketAddr,
    /// TLS certificate PEM
    pub cert_pem: String,
    /// TLS private key PEM
    pub key_pem: String,
}

/// Serve the admission endpoints until the listener fails
pub async fn start_server(config: ServerConfig, state: Arc<WebhookState>) -> Result<(), WebhookError> {
    let tls_config =
        RustlsConfig::from_pem(config.cert_pem.into_bytes(), config.key_pem.into_bytes())
            .await
            .map_err(|e| WebhookError::Config(format!("TLS config error: {e}")))?;

    info!(addr = %config.addr, "Starting admission webhook server");

    axum_server::bind_rustls(config.addr, tls_config)
        .serve(webhook_router(state).into_make_service())
        .await?;
    Ok(())
}
