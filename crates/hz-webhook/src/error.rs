//! Webhook server errors

/// Error type for running the webhook server
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// TLS material could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// The listener failed
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}
