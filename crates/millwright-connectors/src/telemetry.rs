//! PLC telemetry connector — latest tag snapshots from the data API.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::connector::{ConnectorError, ServiceConnector};

/// A single tag snapshot: tag name -> value.
pub type TagMap = serde_json::Map<String, Value>;

#[async_trait]
pub trait TelemetrySource: ServiceConnector {
    /// Most recent tag rows, newest first. Callers typically use only the
    /// first row.
    async fn get_latest_tags(
        &self,
        node_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TagMap>, ConnectorError>;
}

pub struct TelemetryConnector {
    client: reqwest::Client,
    base_url: String,
}

impl TelemetryConnector {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ServiceConnector for TelemetryConnector {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    async fn health_check(&self) -> Value {
        let url = format!("{}/api/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => json!({"status": "healthy", "code": resp.status().as_u16()}),
            Err(e) => json!({"status": "unhealthy", "error": e.to_string()}),
        }
    }
}

#[async_trait]
impl TelemetrySource for TelemetryConnector {
    async fn get_latest_tags(
        &self,
        node_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TagMap>, ConnectorError> {
        let url = format!("{}/api/tags", self.base_url);
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(node) = node_id {
            query.push(("node_id", node.to_string()));
        }

        let resp = self.client.get(&url).query(&query).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ConnectorError::Api {
                connector: "telemetry",
                status,
                message,
            });
        }
        resp.json::<Vec<TagMap>>()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))
    }
}
