//! Diagram renderer connector — turns a structured diagram specification
//! into a PNG via the external rendering service.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::connector::{ConnectorError, ServiceConnector};

#[async_trait]
pub trait DiagramRenderer: ServiceConnector {
    /// Render a diagram spec into PNG bytes.
    async fn render(&self, spec: &Value) -> Result<Vec<u8>, ConnectorError>;
}

pub struct RendererConnector {
    client: reqwest::Client,
    base_url: String,
}

impl RendererConnector {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .expect("reqwest client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ServiceConnector for RendererConnector {
    fn name(&self) -> &'static str {
        "renderer"
    }

    async fn health_check(&self) -> Value {
        match self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(resp) => json!({"status": "healthy", "code": resp.status().as_u16()}),
            Err(e) => json!({"status": "unhealthy", "error": e.to_string()}),
        }
    }
}

#[async_trait]
impl DiagramRenderer for RendererConnector {
    async fn render(&self, spec: &Value) -> Result<Vec<u8>, ConnectorError> {
        let resp = self
            .client
            .post(format!("{}/render", self.base_url))
            .json(spec)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ConnectorError::Api {
                connector: "renderer",
                status,
                message,
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
