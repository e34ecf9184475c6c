//! Current tag values, rendered the way technicians read them.

use async_trait::async_trait;
use tracing::warn;

use millwright_core::types::{InboundMessage, Intent, OutboundMessage};
use millwright_diagnosis::prompts::{display_tag_value, is_reserved_key};

use crate::skill::{Skill, SkillContext, SkillError};

pub struct StatusSkill;

#[async_trait]
impl Skill for StatusSkill {
    fn name(&self) -> &'static str {
        "status"
    }

    fn description(&self) -> &'static str {
        "Show current PLC tag values"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Status]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        let Some(telemetry) = &ctx.connectors.telemetry else {
            return Ok(OutboundMessage::reply_to(
                message,
                "Telemetry is not configured.",
            ));
        };

        let rows = match telemetry
            .get_latest_tags(message.node_id.as_deref(), 1)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(err = %e, "telemetry read failed");
                return Ok(OutboundMessage::reply_to(
                    message,
                    "Cannot reach PLC telemetry right now.",
                ));
            }
        };
        let Some(tags) = rows.into_iter().next() else {
            return Ok(OutboundMessage::reply_to(message, "No tag data available."));
        };

        let mut lines = vec!["**Equipment Status**".to_string(), String::new()];
        let mut keys: Vec<&String> = tags.keys().collect();
        keys.sort();
        for key in keys {
            if is_reserved_key(key) {
                continue;
            }
            lines.push(format!("  {}: {}", key, display_tag_value(&tags[key])));
        }

        Ok(OutboundMessage::reply_to(message, lines.join("\n")))
    }
}
