//! General conversation with plant context. Mirrors the diagnose skill's
//! KB pathway, keyed on the raw query instead of a fault code.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use millwright_core::types::{InboundMessage, Intent, OutboundMessage};
use millwright_diagnosis::prompts::SYSTEM_PROMPT;
use millwright_llm::provider::ChatMessage;
use millwright_llm::router::RouteRequest;

use crate::kb::{atom_answer, atom_layer0_ready, kb_context, sources_block, LAYER0_FOOTER};
use crate::skill::{
    history_from_metadata, llm_unavailable_reply, model_footer, tag_llm_response, Skill,
    SkillContext, SkillError,
};

pub struct ChatSkill;

#[async_trait]
impl Skill for ChatSkill {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn description(&self) -> &'static str {
        "General conversation with plant context"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Chat, Intent::Unknown]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        let query = message.text.trim();

        let atoms = match &ctx.connectors.knowledge {
            Some(kb) if !query.is_empty() => match kb.search(query, 3).await {
                Ok(atoms) => atoms,
                Err(e) => {
                    warn!(err = %e, "KB search failed for chat");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        // Layer-0: when the top-ranked atom is directly actionable, answer
        // from the KB without an LLM call.
        if let Some(top) = atoms.first() {
            if atom_layer0_ready(top) {
                let text = format!(
                    "{}{}{}",
                    atom_answer(top),
                    sources_block(&atoms),
                    LAYER0_FOOTER
                );
                let mut out = OutboundMessage::reply_to(message, text);
                out.metadata.insert("layer".into(), json!("kb_direct"));
                return Ok(out);
            }
        }

        // Full history forwarded; KB context rides on the final user turn.
        let mut messages = history_from_metadata(message);
        let content = if atoms.is_empty() {
            query.to_string()
        } else {
            format!(
                "{query}\n\nRelevant knowledge base context:\n{}",
                kb_context(&atoms, 300)
            )
        };
        messages.push(ChatMessage::user(content));

        let req = RouteRequest::new(Intent::Chat, messages).system_prompt(SYSTEM_PROMPT);
        let resp = match ctx.llm.route(req).await {
            Ok(r) => r,
            Err(e) => return Ok(llm_unavailable_reply(message, &e)),
        };

        let text = format!("{}{}{}", resp.text, sources_block(&atoms), model_footer(&resp));
        let mut out = OutboundMessage::reply_to(message, text);
        tag_llm_response(&mut out, &resp);
        Ok(out)
    }
}
