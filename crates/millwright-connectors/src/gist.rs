//! Gist connector — publishes generated documents and portable work orders
//! to the external gist service.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::connector::{ConnectorError, ServiceConnector};

#[derive(Debug, Clone)]
pub struct GistFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GistHandle {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait GistPublisher: ServiceConnector {
    async fn create(
        &self,
        description: &str,
        files: &[GistFile],
        public: bool,
    ) -> Result<GistHandle, ConnectorError>;
}

pub struct GistConnector {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl GistConnector {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(token, "https://api.github.com")
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client"),
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ServiceConnector for GistConnector {
    fn name(&self) -> &'static str {
        "gist"
    }

    async fn health_check(&self) -> Value {
        if self.token.is_empty() {
            return json!({"status": "disabled"});
        }
        match self
            .client
            .get(format!("{}/rate_limit", self.base_url))
            .bearer_auth(&self.token)
            .header("user-agent", "millwright")
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => json!({"status": "healthy"}),
            Ok(resp) => json!({"status": "unhealthy", "code": resp.status().as_u16()}),
            Err(e) => json!({"status": "unhealthy", "error": e.to_string()}),
        }
    }
}

#[async_trait]
impl GistPublisher for GistConnector {
    async fn create(
        &self,
        description: &str,
        files: &[GistFile],
        public: bool,
    ) -> Result<GistHandle, ConnectorError> {
        let mut file_map = serde_json::Map::new();
        for f in files {
            file_map.insert(f.name.clone(), json!({"content": f.content}));
        }

        let resp = self
            .client
            .post(format!("{}/gists", self.base_url))
            .bearer_auth(&self.token)
            .header("user-agent", "millwright")
            .header("accept", "application/vnd.github+json")
            .json(&json!({
                "description": description,
                "public": public,
                "files": file_map,
            }))
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ConnectorError::Api {
                connector: "gist",
                status,
                message,
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let url = body
            .get("html_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if id.is_empty() || url.is_empty() {
            return Err(ConnectorError::Parse(
                "gist response missing id or html_url".into(),
            ));
        }
        Ok(GistHandle { id, url })
    }
}
