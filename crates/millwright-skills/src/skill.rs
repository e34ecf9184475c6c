//! The skill abstraction: a unit of capability mapped to one or more
//! intents, with its collaborators injected through `SkillContext`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use millwright_connectors::{ConnectorError, Connectors};
use millwright_core::config::MillwrightConfig;
use millwright_core::metrics::MetricsCollector;
use millwright_core::types::{InboundMessage, Intent, OutboundMessage};
use millwright_enrich::EnrichmentPipeline;
use millwright_llm::provider::{ChatMessage, LlmResponse, Role};
use millwright_llm::router::{LlmRouter, RouterError};

/// Side-channel for messages outside the normal reply path (e.g. the
/// enrichment notification after a photo reply). Constructor-injected;
/// absent when the channel cannot deliver them.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, message: OutboundMessage);
}

/// Injected dependencies available to every skill. All shared mutable
/// state lives behind these collaborators, never in the skill itself.
#[derive(Clone)]
pub struct SkillContext {
    pub llm: Arc<LlmRouter>,
    pub connectors: Connectors,
    pub config: Arc<MillwrightConfig>,
    pub metrics: Arc<MetricsCollector>,
    pub notifier: Option<Arc<dyn NotificationSink>>,
    pub enrichment: Option<Arc<EnrichmentPipeline>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error(transparent)]
    NoProvider(#[from] RouterError),

    #[error("connector `{0}` is not configured or unavailable")]
    ConnectorUnavailable(&'static str),

    #[error("could not parse model output: {0}")]
    Parse(String),

    #[error("permission denied: {0}")]
    PolicyDenied(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Skill: Send + Sync {
    /// Skill identifier.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Which intents this skill handles.
    fn intents(&self) -> &'static [Intent];

    /// Process a message and produce a reply.
    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError>;
}

/// The user-facing apology when every provider in the route is exhausted.
pub fn llm_unavailable_reply(message: &InboundMessage, err: &RouterError) -> OutboundMessage {
    tracing::warn!(err = %err, "all providers exhausted");
    OutboundMessage::reply_to(
        message,
        "All AI providers are currently unavailable. Please try again in a few minutes.",
    )
}

/// Conversation history injected by the channel adapter via
/// `metadata.history` (`[{role, content}]`), oldest first.
pub fn history_from_metadata(message: &InboundMessage) -> Vec<ChatMessage> {
    let Some(history) = message.metadata.get("history").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    history
        .iter()
        .filter_map(|turn| {
            let content = turn.get("content")?.as_str()?.to_string();
            let role = match turn.get("role").and_then(|r| r.as_str()) {
                Some("assistant") => Role::Assistant,
                _ => Role::User,
            };
            Some(ChatMessage { role, content })
        })
        .collect()
}

/// Standard model/latency footer appended to LLM-backed replies.
pub fn model_footer(resp: &LlmResponse) -> String {
    format!("\n\n_Model: {} | {}ms_", resp.model, resp.latency_ms)
}

/// Stamp provider/model/latency onto the reply metadata so the dispatcher
/// can record metrics and the HTTP surface can echo them.
pub fn tag_llm_response(out: &mut OutboundMessage, resp: &LlmResponse) {
    out.metadata.insert("provider".into(), json!(resp.provider));
    out.metadata.insert("model".into(), json!(resp.model));
    out.metadata.insert("latency_ms".into(), json!(resp.latency_ms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use millwright_core::types::ChannelKind;

    #[test]
    fn history_parses_roles_and_skips_malformed_turns() {
        let mut msg = InboundMessage::new(ChannelKind::HttpApi, "u", "q");
        msg.metadata.insert(
            "history".into(),
            json!([
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "second"},
                {"content": "role missing defaults to user"},
                {"role": "assistant"},
            ]),
        );
        let history = history_from_metadata(&msg);
        assert_eq!(history.len(), 3);
        assert!(matches!(history[0].role, Role::User));
        assert!(matches!(history[1].role, Role::Assistant));
        assert!(matches!(history[2].role, Role::User));
    }

    #[test]
    fn no_history_metadata_is_empty() {
        let msg = InboundMessage::new(ChannelKind::HttpApi, "u", "q");
        assert!(history_from_metadata(&msg).is_empty());
    }
}
