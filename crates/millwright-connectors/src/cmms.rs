//! CMMS connector — assets and work orders behind a bearer-token login.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

use crate::connector::{ConnectorError, ServiceConnector};

#[derive(Debug, Clone, Serialize)]
pub struct WorkOrderRequest {
    pub title: String,
    pub description: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<i64>,
}

#[async_trait]
pub trait Cmms: ServiceConnector {
    /// Create a work order; returns the service's work-order record.
    async fn create_work_order(&self, req: &WorkOrderRequest) -> Result<Value, ConnectorError>;

    async fn list_assets(&self) -> Result<Vec<Value>, ConnectorError>;
}

pub struct CmmsConnector {
    client: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    token: RwLock<String>,
}

impl CmmsConnector {
    pub fn new(base_url: &str, email: &str, password: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
            password: password.to_string(),
            token: RwLock::new(String::new()),
        }
    }

    async fn login(&self) -> Result<(), ConnectorError> {
        let url = format!("{}/auth/signin", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&json!({"email": self.email, "password": self.password}))
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ConnectorError::Api {
                connector: "cmms",
                status,
                message,
            });
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))?;
        let token = body
            .get("accessToken")
            .or_else(|| body.get("token"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        *self.token.write().await = token;
        Ok(())
    }

    async fn bearer(&self) -> String {
        self.token.read().await.clone()
    }
}

#[async_trait]
impl ServiceConnector for CmmsConnector {
    fn name(&self) -> &'static str {
        "cmms"
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        if !self.email.is_empty() && !self.password.is_empty() {
            if let Err(e) = self.login().await {
                warn!(err = %e, "CMMS login failed at connect; will retry on first use");
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> Value {
        match self.client.get(&self.base_url).send().await {
            Ok(resp) => json!({"status": "healthy", "code": resp.status().as_u16()}),
            Err(e) => json!({"status": "unhealthy", "error": e.to_string()}),
        }
    }
}

#[async_trait]
impl Cmms for CmmsConnector {
    async fn create_work_order(&self, req: &WorkOrderRequest) -> Result<Value, ConnectorError> {
        // lazily re-login when we have credentials but no token yet
        if self.bearer().await.is_empty() && !self.email.is_empty() {
            self.login().await?;
        }

        let url = format!("{}/api/work-orders", self.base_url);
        let mut body = json!({
            "title": req.title,
            "description": req.description,
            "priority": req.priority,
        });
        if let Some(asset_id) = req.asset_id {
            body["asset"] = json!({"id": asset_id});
        }

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.bearer().await)
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ConnectorError::Api {
                connector: "cmms",
                status,
                message,
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))
    }

    async fn list_assets(&self) -> Result<Vec<Value>, ConnectorError> {
        let url = format!("{}/api/assets", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.bearer().await)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ConnectorError::Api {
                connector: "cmms",
                status,
                message,
            });
        }
        resp.json::<Vec<Value>>()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))
    }
}
