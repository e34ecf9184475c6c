//! Web search through the search-oriented provider route, with citations
//! attached from the provider's raw response.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use millwright_core::types::{InboundMessage, Intent, OutboundMessage};
use millwright_llm::provider::ChatMessage;
use millwright_llm::router::RouteRequest;

use crate::skill::{llm_unavailable_reply, tag_llm_response, Skill, SkillContext, SkillError};

pub struct SearchSkill;

#[async_trait]
impl Skill for SearchSkill {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Web search with cited sources"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Search]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        let mut query = message.text.trim();
        if let Some(stripped) = query.strip_prefix("/search") {
            query = stripped.trim();
        }
        if query.is_empty() {
            return Ok(OutboundMessage::reply_to(
                message,
                "Please provide a search query. Example: `/search PLC maintenance best practices`",
            ));
        }

        let req = RouteRequest::new(Intent::Search, vec![ChatMessage::user(query)]);
        let resp = match ctx.llm.route(req).await {
            Ok(r) => r,
            Err(e) => return Ok(llm_unavailable_reply(message, &e)),
        };

        let citations = extract_citations(resp.raw.as_ref());
        let mut text = resp.text.clone();
        if !citations.is_empty() {
            text.push_str("\n\n**Sources:**\n");
            for (i, url) in citations.iter().take(5).enumerate() {
                text.push_str(&format!("{}. {}\n", i + 1, url));
            }
        }

        let preview: String = query.chars().take(50).collect();
        info!(
            query = %preview,
            model = %resp.model,
            citations = citations.len(),
            "search complete"
        );

        let mut out = OutboundMessage::reply_to(message, text);
        tag_llm_response(&mut out, &resp);
        Ok(out)
    }
}

fn extract_citations(raw: Option<&Value>) -> Vec<String> {
    raw.and_then(|v| v.get("citations"))
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn citations_come_from_the_raw_body() {
        let raw = json!({"citations": ["https://a.example", "https://b.example"]});
        assert_eq!(
            extract_citations(Some(&raw)),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(extract_citations(None).is_empty());
        assert!(extract_citations(Some(&json!({"choices": []}))).is_empty());
    }
}
