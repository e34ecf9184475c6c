use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{connector} error ({status}): {message}")]
    Api {
        connector: &'static str,
        status: u16,
        message: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Common interface for every external non-LLM service.
///
/// Connectors own their network clients: acquired when the connector is
/// built, released on `disconnect`. `health_check` must never fail — it
/// reports `{"status": "unhealthy", ...}` instead.
#[async_trait]
pub trait ServiceConnector: Send + Sync {
    /// Stable lowercase identifier, used as the key in health output.
    fn name(&self) -> &'static str;

    /// Establish the connection (optional — most HTTP connectors are
    /// connectionless and only log here).
    async fn connect(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    /// Graceful teardown.
    async fn disconnect(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    /// Probe the service. Always returns a status object.
    async fn health_check(&self) -> Value;
}
