//! Remote shell connector — command execution on named maintenance hosts.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::connector::{ConnectorError, ServiceConnector};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellResult {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, alias = "returncode")]
    pub exit_code: Option<i32>,
}

#[async_trait]
pub trait RemoteShell: ServiceConnector {
    /// Run `command` on `host` (or the first configured host when `None`).
    async fn execute(
        &self,
        command: &str,
        host: Option<&str>,
        timeout_secs: u64,
    ) -> Result<ShellResult, ConnectorError>;

    /// Configured host labels, sorted.
    fn hosts(&self) -> Vec<String>;
}

pub struct ShellConnector {
    client: reqwest::Client,
    hosts: HashMap<String, String>,
}

impl ShellConnector {
    pub fn new(hosts: HashMap<String, String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(35))
                .build()
                .expect("reqwest client"),
            hosts: hosts
                .into_iter()
                .map(|(label, url)| (label, url.trim_end_matches('/').to_string()))
                .collect(),
        }
    }

    fn resolve(&self, host: Option<&str>) -> Result<&str, ConnectorError> {
        if let Some(label) = host {
            if let Some(url) = self.hosts.get(label) {
                return Ok(url);
            }
        }
        // fall back to the first host in label order so resolution is stable
        let mut labels: Vec<&String> = self.hosts.keys().collect();
        labels.sort();
        labels
            .first()
            .map(|label| self.hosts[*label].as_str())
            .ok_or(ConnectorError::NotConfigured("shell"))
    }
}

#[async_trait]
impl ServiceConnector for ShellConnector {
    fn name(&self) -> &'static str {
        "shell"
    }

    async fn health_check(&self) -> Value {
        let mut results = serde_json::Map::new();
        for (label, url) in &self.hosts {
            let health = match self.client.get(format!("{url}/health")).send().await {
                Ok(resp) => json!({"status": "healthy", "code": resp.status().as_u16()}),
                Err(e) => json!({"status": "unhealthy", "error": e.to_string()}),
            };
            results.insert(label.clone(), health);
        }
        Value::Object(results)
    }
}

#[async_trait]
impl RemoteShell for ShellConnector {
    async fn execute(
        &self,
        command: &str,
        host: Option<&str>,
        timeout_secs: u64,
    ) -> Result<ShellResult, ConnectorError> {
        let base = self.resolve(host)?;
        let resp = self
            .client
            .post(format!("{base}/shell"))
            .json(&json!({"command": command, "timeout": timeout_secs}))
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ConnectorError::Api {
                connector: "shell",
                status,
                message,
            });
        }
        resp.json::<ShellResult>()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))
    }

    fn hosts(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.hosts.keys().cloned().collect();
        labels.sort();
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_named_host() {
        let connector = ShellConnector::new(HashMap::from([
            ("plc".to_string(), "http://plc:9000/".to_string()),
            ("travel".to_string(), "http://travel:9000".to_string()),
        ]));
        assert_eq!(connector.resolve(Some("travel")).unwrap(), "http://travel:9000");
        // unknown label falls back to the first in sorted order
        assert_eq!(connector.resolve(Some("nope")).unwrap(), "http://plc:9000");
        assert_eq!(connector.resolve(None).unwrap(), "http://plc:9000");
    }

    #[test]
    fn resolve_fails_with_no_hosts() {
        let connector = ShellConnector::new(HashMap::new());
        assert!(matches!(
            connector.resolve(None),
            Err(ConnectorError::NotConfigured("shell"))
        ));
    }

    #[test]
    fn shell_result_accepts_returncode_alias() {
        let r: ShellResult =
            serde_json::from_value(json!({"stdout": "ok", "returncode": 0})).unwrap();
        assert_eq!(r.exit_code, Some(0));
    }
}
