//! Generic provider for OpenAI-compatible chat completion APIs (Groq,
//! DeepSeek, OpenRouter, NVIDIA, Gemini's compat endpoint, Perplexity and
//! custom endpoints).

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use millwright_core::config::CompatProviderEntry;

use crate::provider::{ChatMessage, ImagePayload, LlmProvider, LlmResponse, ProviderError};
use crate::registry;

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    id: String,
    api_key: String,
    endpoint: String,
    model: String,
    vision: bool,
}

impl OpenAiCompatProvider {
    /// Build a provider from a config entry, resolving well-known IDs
    /// through the registry. Unknown IDs require `base_url`.
    pub fn from_entry(entry: &CompatProviderEntry) -> Result<Self, String> {
        let known = registry::lookup(&entry.id);

        let base_url = entry
            .base_url
            .clone()
            .or_else(|| known.map(|k| k.base_url.to_string()))
            .ok_or_else(|| format!("provider `{}` is not in the registry and has no base_url", entry.id))?;
        let chat_path = entry
            .chat_path
            .clone()
            .or_else(|| known.map(|k| k.chat_path.to_string()))
            .unwrap_or_else(|| "/v1/chat/completions".to_string());
        let model = entry
            .model
            .clone()
            .or_else(|| known.map(|k| k.default_model.to_string()))
            .unwrap_or_else(|| "gpt-4o".to_string());
        let vision = entry.vision.unwrap_or_else(|| known.map(|k| k.vision).unwrap_or(false));

        Ok(Self {
            client: reqwest::Client::new(),
            id: entry.id.clone(),
            api_key: entry.api_key.clone(),
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), chat_path),
            model,
            vision,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, body: serde_json::Value) -> Result<LlmResponse, ProviderError> {
        debug!(provider = %self.id, model = %self.model, "sending chat completion request");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
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
            warn!(provider = %self.id, status, body = %text, "API error");
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

        let text = api_resp
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ProviderError::Empty);
        }

        Ok(LlmResponse {
            text,
            model: api_resp.model.unwrap_or_else(|| self.model.clone()),
            provider: self.id.clone(),
            tokens_used: api_resp.usage.map(|u| u.total_tokens).unwrap_or(0),
            latency_ms: 0,
            raw: Some(raw),
        })
    }

    fn message_values(&self, messages: &[ChatMessage], system_prompt: &str) -> Vec<serde_json::Value> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            out.push(serde_json::json!({"role": "system", "content": system_prompt}));
        }
        for m in messages {
            out.push(serde_json::json!({"role": m.role, "content": m.content}));
        }
        out
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        max_tokens: u32,
        temperature: f32,
        json_mode: bool,
    ) -> Result<LlmResponse, ProviderError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": self.message_values(messages, system_prompt),
            "max_tokens": max_tokens,
            "temperature": temperature,
        });
        if json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        self.post(body).await
    }

    async fn complete_with_vision(
        &self,
        messages: &[ChatMessage],
        images: &[ImagePayload],
        system_prompt: &str,
        max_tokens: u32,
    ) -> Result<LlmResponse, ProviderError> {
        if !self.vision {
            return Err(ProviderError::CapabilityMissing(format!(
                "{} does not accept image input",
                self.id
            )));
        }

        // The final user turn carries the image blocks; earlier turns stay
        // plain text.
        let mut msgs = Vec::new();
        if !system_prompt.is_empty() {
            msgs.push(serde_json::json!({"role": "system", "content": system_prompt}));
        }
        let (last, rest) = match messages.split_last() {
            Some((last, rest)) => (last, rest),
            None => return Err(ProviderError::Parse("vision request with no messages".into())),
        };
        for m in rest {
            msgs.push(serde_json::json!({"role": m.role, "content": m.content}));
        }

        let mut content: Vec<serde_json::Value> = images
            .iter()
            .map(|img| {
                let b64 = base64::engine::general_purpose::STANDARD.encode(&img.data);
                serde_json::json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:{};base64,{}", img.mime_type, b64)},
                })
            })
            .collect();
        content.push(serde_json::json!({"type": "text", "text": last.content}));
        msgs.push(serde_json::json!({"role": "user", "content": content}));

        let body = serde_json::json!({
            "model": self.model,
            "messages": msgs,
            "max_tokens": max_tokens,
        });
        self.post(body).await
    }
}

// Wire types — only used for deserialization.

#[derive(Deserialize)]
struct ApiResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> CompatProviderEntry {
        CompatProviderEntry {
            id: id.to_string(),
            api_key: "key".to_string(),
            base_url: None,
            chat_path: None,
            model: None,
            fallback_model: None,
            vision: None,
            daily_request_limit: 0,
            daily_token_limit: 0,
        }
    }

    #[test]
    fn registry_entry_resolves_endpoint_and_model() {
        let p = OpenAiCompatProvider::from_entry(&entry("groq")).unwrap();
        assert_eq!(p.name(), "groq");
        assert_eq!(p.endpoint, "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(p.model(), "llama-3.3-70b-versatile");
        assert!(!p.supports_vision());
        assert!(p.supports_json_mode());
    }

    #[test]
    fn unknown_entry_requires_base_url() {
        assert!(OpenAiCompatProvider::from_entry(&entry("mystery")).is_err());

        let mut custom = entry("mystery");
        custom.base_url = Some("http://localhost:4000".to_string());
        custom.model = Some("local-model".to_string());
        let p = OpenAiCompatProvider::from_entry(&custom).unwrap();
        assert_eq!(p.endpoint, "http://localhost:4000/v1/chat/completions");
    }

    #[test]
    fn vision_override_beats_registry() {
        let mut e = entry("groq");
        e.vision = Some(true);
        let p = OpenAiCompatProvider::from_entry(&e).unwrap();
        assert!(p.supports_vision());
    }

    #[test]
    fn empty_api_key_is_unavailable() {
        let mut e = entry("groq");
        e.api_key = String::new();
        let p = OpenAiCompatProvider::from_entry(&e).unwrap();
        assert!(!p.is_available());
    }
}
