//! Wiring diagram generation: a JSON-mode call produces a structured
//! diagram spec, which the external renderer turns into an image. One
//! retry on parse failure, with the bad output and the error fed back.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use millwright_core::types::{Attachment, AttachmentKind, InboundMessage, Intent, OutboundMessage};
use millwright_enrich::json_repair::repair_and_parse;
use millwright_llm::provider::ChatMessage;
use millwright_llm::router::RouteRequest;

use crate::kb::kb_context;
use crate::skill::{
    llm_unavailable_reply, model_footer, tag_llm_response, Skill, SkillContext, SkillError,
};

const DIAGRAM_SYSTEM_PROMPT: &str = "\
You are an industrial controls engineer. Design wiring diagrams as structured data.

Output ONLY valid JSON with this exact schema:
{\"title\": \"short diagram title\",
 \"components\": [{\"id\": \"PLC\", \"label\": \"Micro820 PLC\", \"terminals\": [\"DO0\", \"COM\", \"DI0\"]}],
 \"connections\": [{\"from\": \"PLC.DO0\", \"to\": \"K1.A1\", \"label\": \"coil +24V\"}],
 \"notes\": \"wiring sequence and safety notes\"}

Rules:
1. Use real terminal designations (A1/A2 coils, L1/T1 power poles, 13/14 aux contacts)
2. Include power distribution AND control wiring
3. Mention voltage and current ratings in notes where relevant";

pub struct DiagramSkill;

#[async_trait]
impl Skill for DiagramSkill {
    fn name(&self) -> &'static str {
        "diagram"
    }

    fn description(&self) -> &'static str {
        "Generate wiring diagrams for PLC, VFD, motor, and sensor connections"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Diagram]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        let mut request = message.text.trim();
        for prefix in ["/diagram", "/wiring"] {
            if let Some(stripped) = request.strip_prefix(prefix) {
                request = stripped.trim();
            }
        }
        if request.is_empty() {
            return Ok(OutboundMessage::reply_to(
                message,
                "Describe the circuit to draw. Example: `/diagram contactor with start/stop buttons and a VFD`",
            ));
        }

        let mut prompt = format!("Generate a wiring diagram for the following request.\n\nREQUEST: {request}");
        if let Some(kb) = &ctx.connectors.knowledge {
            if let Ok(atoms) = kb.search(request, 3).await {
                if !atoms.is_empty() {
                    prompt.push_str("\n\nRELEVANT KNOWLEDGE BASE ENTRIES:\n");
                    prompt.push_str(&kb_context(&atoms, 300));
                }
            }
        }

        // first attempt
        let first_req = RouteRequest::new(Intent::Diagram, vec![ChatMessage::user(prompt.clone())])
            .system_prompt(DIAGRAM_SYSTEM_PROMPT)
            .max_tokens(2048)
            .json_mode(true);
        let first = match ctx.llm.route(first_req).await {
            Ok(r) => r,
            Err(e) => return Ok(llm_unavailable_reply(message, &e)),
        };

        let (spec, resp) = match repair_and_parse(&first.text) {
            Some(spec) => (spec, first),
            None => {
                // single retry with the bad turn and the error appended
                warn!("diagram spec parse failed; retrying once");
                let retry_req = RouteRequest::new(
                    Intent::Diagram,
                    vec![
                        ChatMessage::user(prompt),
                        ChatMessage::assistant(first.text.clone()),
                        ChatMessage::user(
                            "Your previous reply was not valid JSON. \
                             Reply again with ONLY the JSON object, no commentary.",
                        ),
                    ],
                )
                .system_prompt(DIAGRAM_SYSTEM_PROMPT)
                .max_tokens(2048)
                .json_mode(true);
                let second = match ctx.llm.route(retry_req).await {
                    Ok(r) => r,
                    Err(e) => return Ok(llm_unavailable_reply(message, &e)),
                };
                match repair_and_parse(&second.text) {
                    Some(spec) => (spec, second),
                    None => {
                        return Err(SkillError::Parse(
                            "diagram spec was not valid JSON after one retry".into(),
                        ))
                    }
                }
            }
        };

        let title = spec
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Wiring Diagram")
            .to_string();
        let notes = spec
            .get("notes")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // render through the external service when it is configured
        if let Some(renderer) = &ctx.connectors.renderer {
            match renderer.render(&spec).await {
                Ok(png) => {
                    let mut text = format!("**{title}**");
                    if !notes.is_empty() {
                        text.push_str(&format!("\n\n{notes}"));
                    }
                    text.push_str(&model_footer(&resp));
                    let mut out = OutboundMessage::reply_to(message, text);
                    out = out.with_attachment(Attachment {
                        kind: AttachmentKind::Image,
                        data: Some(png),
                        url: String::new(),
                        mime_type: "image/png".to_string(),
                        filename: Some("wiring-diagram.png".to_string()),
                    });
                    tag_llm_response(&mut out, &resp);
                    return Ok(out);
                }
                Err(e) => {
                    warn!(err = %e, "diagram render failed; replying with the spec");
                }
            }
        }

        let pretty = serde_json::to_string_pretty(&spec).unwrap_or_else(|_| spec.to_string());
        let text = format!(
            "**{title}**\n\nDiagram renderer is not available; here is the wiring plan:\n\n\
             ```json\n{pretty}\n```{}",
            model_footer(&resp)
        );
        let mut out = OutboundMessage::reply_to(message, text);
        tag_llm_response(&mut out, &resp);
        Ok(out)
    }
}
