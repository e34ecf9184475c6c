//! Central dispatch: classify, look up the skill, invoke it, and always
//! come back with a well-formed reply. The dispatcher is stateless across
//! calls; every piece of mutable state lives in the injected context.

use serde_json::{json, Value};
use tracing::{error, info};

use millwright_core::types::{InboundMessage, Intent, OutboundMessage};

use crate::intent::classify;
use crate::registry::SkillRegistry;
use crate::skill::SkillContext;

pub struct Dispatcher {
    registry: SkillRegistry,
    ctx: SkillContext,
}

impl Dispatcher {
    pub fn new(registry: SkillRegistry, ctx: SkillContext) -> Self {
        Self { registry, ctx }
    }

    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    pub fn context(&self) -> &SkillContext {
        &self.ctx
    }

    /// Total: every inbound message produces exactly one outbound message
    /// on the same channel, for the same user.
    pub async fn dispatch(&self, mut message: InboundMessage) -> OutboundMessage {
        if message.intent == Intent::Unknown {
            message.intent = classify(&message);
        }

        let preview: String = message.text.chars().take(80).collect();
        info!(
            user = %message.user_id,
            intent = %message.intent,
            text = %preview,
            "dispatch"
        );

        let skill = self
            .registry
            .get(message.intent)
            .or_else(|| self.registry.get(Intent::Chat));
        let Some(skill) = skill else {
            let mut out =
                OutboundMessage::reply_to(&message, "No skill available to handle this request.");
            out.metadata
                .insert("intent".into(), json!(message.intent.as_str()));
            return out;
        };

        match skill.handle(&message, &self.ctx).await {
            Ok(mut response) => {
                let provider = response
                    .metadata
                    .get("provider")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let latency = response
                    .metadata
                    .get("latency_ms")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                self.ctx
                    .metrics
                    .record_request(message.intent.as_str(), &provider, latency);
                response
                    .metadata
                    .insert("intent".into(), json!(message.intent.as_str()));
                response
            }
            Err(e) => {
                error!(skill = skill.name(), err = %e, "skill failed");
                let mut out = OutboundMessage::reply_to(
                    &message,
                    "An error occurred processing your request. Please try again.",
                );
                out.metadata
                    .insert("intent".into(), json!(message.intent.as_str()));
                out
            }
        }
    }
}
