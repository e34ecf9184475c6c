//! Maintenance LLM connector — Ollama on the air-gapped PLC laptop, for
//! inference when the plant network has no internet path.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::connector::{ConnectorError, ServiceConnector};

#[derive(Debug, Clone, Default)]
pub struct MaintenanceReply {
    pub response: String,
    pub model: String,
    pub eval_count: u64,
    pub total_duration_ms: u64,
}

#[async_trait]
pub trait MaintenanceLlm: ServiceConnector {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        system: &str,
        max_tokens: u32,
    ) -> Result<MaintenanceReply, ConnectorError>;

    async fn list_models(&self) -> Result<Vec<String>, ConnectorError>;
}

pub struct MaintenanceLlmConnector {
    client: reqwest::Client,
    base_url: String,
}

impl MaintenanceLlmConnector {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ServiceConnector for MaintenanceLlmConnector {
    fn name(&self) -> &'static str {
        "maintenance_llm"
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        info!(url = %self.base_url, "maintenance LLM connector ready");
        Ok(())
    }

    async fn health_check(&self) -> Value {
        match self.client.get(&self.base_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let models = self.list_models().await.unwrap_or_default();
                json!({"status": "healthy", "models": models})
            }
            Ok(resp) => json!({"status": "unhealthy", "code": resp.status().as_u16()}),
            Err(e) => json!({"status": "unreachable", "url": self.base_url, "error": e.to_string()}),
        }
    }
}

#[async_trait]
impl MaintenanceLlm for MaintenanceLlmConnector {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        system: &str,
        max_tokens: u32,
    ) -> Result<MaintenanceReply, ConnectorError> {
        let mut payload = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {"num_predict": max_tokens},
        });
        if !system.is_empty() {
            payload["system"] = json!(system);
        }

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status, "maintenance LLM generation failed");
            return Err(ConnectorError::Api {
                connector: "maintenance_llm",
                status,
                message,
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))?;
        Ok(MaintenanceReply {
            response: body
                .get("response")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            model: body
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(model)
                .to_string(),
            eval_count: body.get("eval_count").and_then(Value::as_u64).unwrap_or(0),
            // Ollama reports nanoseconds
            total_duration_ms: body
                .get("total_duration")
                .and_then(Value::as_u64)
                .unwrap_or(0)
                / 1_000_000,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ConnectorError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))?;
        Ok(body
            .get("models")
            .and_then(Value::as_array)
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}
