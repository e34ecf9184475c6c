use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8340;
pub const DEFAULT_BIND: &str = "0.0.0.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(String),
}

/// Top-level config (millwright.toml + MILLWRIGHT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MillwrightConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    /// Routing-table overrides, keyed by intent (e.g. `[routes.diagnose]`).
    /// Intents without an override use the compiled-in defaults.
    #[serde(default)]
    pub routes: HashMap<String, RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// When set, `/api/v1/*` requires `X-Api-Key` to match (constant-time).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            log_level: default_log_level(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "bool_true")]
    pub http_api_enabled: bool,
    #[serde(default = "bool_true")]
    pub websocket_enabled: bool,
    /// Users permitted to interact with the gateway. Empty = open (the HTTP
    /// surface has its own api_key gate); SHELL always requires a non-empty
    /// list.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_hour: u32,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            http_api_enabled: true,
            websocket_enabled: true,
            allowed_users: Vec::new(),
            rate_limit_per_hour: default_rate_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub anthropic: Option<AnthropicProviderConfig>,
    /// OpenAI-compatible providers, tried in routing-table order. Each entry
    /// can reference a well-known provider ID (e.g. "groq", "openrouter") or
    /// define a fully custom endpoint via `base_url`.
    #[serde(default)]
    pub compat: Vec<CompatProviderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicProviderConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default)]
    pub daily_request_limit: u64,
    #[serde(default)]
    pub daily_token_limit: u64,
}

/// A single OpenAI-compatible provider entry.
///
/// Well-known IDs are resolved from the built-in registry; unknown IDs
/// require `base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatProviderEntry {
    pub id: String,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub chat_path: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Secondary model to advertise in admin output; the provider itself
    /// always sends `model`.
    #[serde(default)]
    pub fallback_model: Option<String>,
    /// Override the registry's vision capability flag.
    #[serde(default)]
    pub vision: Option<bool>,
    /// 0 = unlimited.
    #[serde(default)]
    pub daily_request_limit: u64,
    #[serde(default)]
    pub daily_token_limit: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorsConfig {
    /// Knowledge-base service base URL.
    #[serde(default)]
    pub kb_url: Option<String>,
    /// PLC telemetry API base URL.
    #[serde(default)]
    pub telemetry_url: Option<String>,
    #[serde(default)]
    pub cmms_url: Option<String>,
    #[serde(default)]
    pub cmms_email: Option<String>,
    #[serde(default)]
    pub cmms_password: Option<String>,
    /// Remote shell executors: label -> base URL.
    #[serde(default)]
    pub shell_hosts: HashMap<String, String>,
    /// Air-gapped maintenance LLM (Ollama) base URL.
    #[serde(default)]
    pub maintenance_url: Option<String>,
    /// Token for the external gist publisher.
    #[serde(default)]
    pub gist_token: Option<String>,
    /// Diagram renderer service base URL.
    #[serde(default)]
    pub renderer_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Skill names to skip at registration time.
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// One routing-table entry: primary provider plus ordered fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

fn bool_true() -> bool {
    true
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_rate_limit() -> u32 {
    60
}
fn default_anthropic_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

impl MillwrightConfig {
    /// Load config from a TOML file with MILLWRIGHT_* env var overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = config_path.unwrap_or("millwright.toml");

        let config: MillwrightConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("MILLWRIGHT_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = MillwrightConfig::default();
        assert_eq!(cfg.server.port, DEFAULT_PORT);
        assert!(cfg.channels.http_api_enabled);
        assert_eq!(cfg.channels.rate_limit_per_hour, 60);
        assert!(cfg.providers.compat.is_empty());
        assert!(cfg.routes.is_empty());
    }

    #[test]
    fn parses_nested_toml() {
        let toml = r#"
            [server]
            port = 9000

            [channels]
            allowed_users = ["1001", "1002"]

            [[providers.compat]]
            id = "groq"
            api_key = "gsk-test"
            daily_request_limit = 14000

            [connectors]
            telemetry_url = "http://localhost:8000"

            [routes.diagnose]
            primary = "openrouter"
            fallbacks = ["groq", "deepseek"]
        "#;
        let cfg: MillwrightConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.channels.allowed_users.len(), 2);
        assert_eq!(cfg.providers.compat[0].id, "groq");
        assert_eq!(cfg.providers.compat[0].daily_request_limit, 14000);
        assert_eq!(
            cfg.connectors.telemetry_url.as_deref(),
            Some("http://localhost:8000")
        );
        let route = &cfg.routes["diagnose"];
        assert_eq!(route.primary, "openrouter");
        assert_eq!(route.fallbacks, vec!["groq", "deepseek"]);
    }
}
