use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{ChatMessage, ImagePayload, LlmProvider, LlmResponse, ProviderError};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
        }
    }

    async fn post(&self, body: serde_json::Value) -> Result<LlmResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %self.model, "sending request to Anthropic");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 401 || status == 403 {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(text));
        }
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited { retry_after_ms: retry });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Anthropic API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let raw: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let api_resp: ApiResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let text: String = api_resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Unknown => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(ProviderError::Empty);
        }

        Ok(LlmResponse {
            text,
            model: api_resp.model,
            provider: "anthropic".to_string(),
            tokens_used: api_resp.usage.input_tokens + api_resp.usage.output_tokens,
            latency_ms: 0,
            raw: Some(raw),
        })
    }

    fn message_values(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect()
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn supports_vision(&self) -> bool {
        true
    }

    /// The messages API has no strict JSON output mode; the router keeps
    /// json_mode requests off this provider.
    fn supports_json_mode(&self) -> bool {
        false
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        max_tokens: u32,
        temperature: f32,
        _json_mode: bool,
    ) -> Result<LlmResponse, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "system": system_prompt,
            "messages": Self::message_values(messages),
        });
        self.post(body).await
    }

    async fn complete_with_vision(
        &self,
        messages: &[ChatMessage],
        images: &[ImagePayload],
        system_prompt: &str,
        max_tokens: u32,
    ) -> Result<LlmResponse, ProviderError> {
        let (last, rest) = match messages.split_last() {
            Some((last, rest)) => (last, rest),
            None => return Err(ProviderError::Parse("vision request with no messages".into())),
        };

        let mut msgs = Self::message_values(rest);

        let mut content: Vec<serde_json::Value> = images
            .iter()
            .map(|img| {
                // the messages API rejects "image/jpg"
                let media_type = if img.mime_type == "image/jpg" {
                    "image/jpeg"
                } else {
                    img.mime_type.as_str()
                };
                serde_json::json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": media_type,
                        "data": base64::engine::general_purpose::STANDARD.encode(&img.data),
                    },
                })
            })
            .collect();
        content.push(serde_json::json!({"type": "text", "text": last.content}));
        msgs.push(serde_json::json!({"role": "user", "content": content}));

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system_prompt,
            "messages": msgs,
        });
        self.post(body).await
    }
}

// Anthropic API response types (private — only used for deserialization).

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_flags() {
        let p = AnthropicProvider::new("sk-test".into(), "claude-sonnet-4-20250514".into(), None);
        assert!(p.is_available());
        assert!(p.supports_vision());
        assert!(!p.supports_json_mode());
    }

    #[test]
    fn missing_key_is_unavailable() {
        let p = AnthropicProvider::new(String::new(), "claude-sonnet-4-20250514".into(), None);
        assert!(!p.is_available());
    }
}
