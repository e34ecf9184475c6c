use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Raw image bytes plus their MIME type, ready for a vision request.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub model: String,
    pub provider: String,
    /// Provider-reported total tokens; 0 when the API reports none.
    pub tokens_used: u32,
    /// Stamped by the router across the provider call boundary.
    pub latency_ms: u64,
    /// Raw response body for callers that need provider-specific fields
    /// (e.g. search citations).
    pub raw: Option<serde_json::Value>,
}

/// Classification a caller can branch on without matching the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    RateLimit,
    CapabilityMissing,
    Transport,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("capability missing: {0}")]
    CapabilityMissing(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("provider returned an empty completion")]
    Empty,
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Auth(_) => ErrorKind::Auth,
            ProviderError::RateLimited { .. } => ErrorKind::RateLimit,
            ProviderError::CapabilityMissing(_) => ErrorKind::CapabilityMissing,
            ProviderError::Transport(_) => ErrorKind::Transport,
            ProviderError::Api { status, .. } if *status == 401 || *status == 403 => {
                ErrorKind::Auth
            }
            ProviderError::Api { status, .. } if *status == 429 => ErrorKind::RateLimit,
            _ => ErrorKind::Unknown,
        }
    }
}

/// Common interface for all LLM providers.
///
/// `complete` and `complete_with_vision` must never return empty text on
/// success — an empty completion is a `ProviderError::Empty`. Providers
/// that do not accept image input keep the default `complete_with_vision`,
/// which fails with `capability_missing`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for routing, budget and health keys.
    fn name(&self) -> &str;

    /// True when credentials are configured.
    fn is_available(&self) -> bool;

    fn supports_vision(&self) -> bool {
        false
    }

    fn supports_json_mode(&self) -> bool {
        true
    }

    /// Send a chat completion request. `system_prompt` is conceptually
    /// prepended to `messages`.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        max_tokens: u32,
        temperature: f32,
        json_mode: bool,
    ) -> Result<LlmResponse, ProviderError>;

    /// Send a vision request with one or more images.
    async fn complete_with_vision(
        &self,
        _messages: &[ChatMessage],
        _images: &[ImagePayload],
        _system_prompt: &str,
        _max_tokens: u32,
    ) -> Result<LlmResponse, ProviderError> {
        Err(ProviderError::CapabilityMissing(format!(
            "{} does not accept image input",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_maps_to_kind() {
        let auth = ProviderError::Api {
            status: 401,
            message: "bad key".into(),
        };
        assert_eq!(auth.kind(), ErrorKind::Auth);

        let limited = ProviderError::Api {
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(limited.kind(), ErrorKind::RateLimit);

        let server = ProviderError::Api {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(server.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn empty_completion_is_unknown_kind() {
        assert_eq!(ProviderError::Empty.kind(), ErrorKind::Unknown);
    }
}
