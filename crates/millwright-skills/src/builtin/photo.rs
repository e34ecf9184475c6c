//! Photo analysis with AI vision, plus the asynchronous KB-enrichment side
//! task. The enrichment result arrives as a separate notification and must
//! never delay the primary reply.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use millwright_core::types::{
    AttachmentKind, ChannelKind, InboundMessage, Intent, OutboundMessage,
};
use millwright_enrich::EnrichmentPipeline;
use millwright_llm::provider::{ChatMessage, ImagePayload};
use millwright_llm::router::RouteRequest;

use crate::skill::{
    llm_unavailable_reply, model_footer, tag_llm_response, NotificationSink, Skill, SkillContext,
    SkillError,
};

const GENERAL_PROMPT: &str = "You are an industrial equipment identification expert. \
    Identify the equipment manufacturer, model, and any visible issues.";

const WIRING_PROMPT: &str = "You are an industrial electrician reading a wiring photo. \
    Identify terminals, wire colors, and connections. Describe the wiring layout \
    precisely, using the terminal designations printed on the devices.";

const DIAGNOSTIC_PROMPT: &str = "You are an industrial maintenance expert examining an \
    equipment photo for problems. Identify the equipment, note any visible damage, \
    wear, or abnormal conditions, and suggest what to inspect first.";

const DEFAULT_CAPTION: &str =
    "Identify this equipment. What is it? Note any visible defects or issues.";

/// Component designators like K1, Q2, F3 in a caption become the
/// enrichment pipeline's tag hint.
static COMPONENT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([QKFSMHUTBX]\d+)\b").unwrap());

pub struct PhotoSkill;

#[async_trait]
impl Skill for PhotoSkill {
    fn name(&self) -> &'static str {
        "photo"
    }

    fn description(&self) -> &'static str {
        "Analyze equipment photos with AI vision"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Photo]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        let images: Vec<ImagePayload> = message
            .attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::Image)
            .filter_map(|a| {
                a.data.as_ref().map(|data| ImagePayload {
                    data: data.clone(),
                    mime_type: if a.mime_type.is_empty() {
                        "image/jpeg".to_string()
                    } else {
                        a.mime_type.clone()
                    },
                })
            })
            .collect();

        if images.is_empty() {
            return Ok(OutboundMessage::reply_to(
                message,
                "No image found. Send a photo for analysis.",
            ));
        }

        let caption = message.text.trim();
        let system_prompt = select_system_prompt(caption);
        let prompt = if caption.is_empty() {
            DEFAULT_CAPTION
        } else {
            caption
        };

        let req = RouteRequest::new(Intent::Photo, vec![ChatMessage::user(prompt)])
            .system_prompt(system_prompt)
            .images(images.clone());
        let resp = match ctx.llm.route(req).await {
            Ok(r) => r,
            Err(e) => return Ok(llm_unavailable_reply(message, &e)),
        };

        // The reply is formulated; the enrichment side task runs after it
        // and is never awaited.
        if let Some(pipeline) = ctx.enrichment.clone() {
            if let Some(image) = images.into_iter().next() {
                spawn_enrichment(pipeline, ctx.notifier.clone(), message, image, caption);
            }
        }

        let text = format!("{}{}", resp.text, model_footer(&resp));
        let mut out = OutboundMessage::reply_to(message, text);
        tag_llm_response(&mut out, &resp);
        Ok(out)
    }
}

/// Caption keywords pick the vision system prompt.
fn select_system_prompt(caption: &str) -> &'static str {
    let lower = caption.to_lowercase();
    if ["wiring", "diagram", "terminal"].iter().any(|k| lower.contains(k)) {
        WIRING_PROMPT
    } else if ["diagnos", "fault", "issue"].iter().any(|k| lower.contains(k)) {
        DIAGNOSTIC_PROMPT
    } else {
        GENERAL_PROMPT
    }
}

fn extract_component_tag(caption: &str) -> Option<String> {
    COMPONENT_TAG
        .captures(&caption.to_uppercase())
        .map(|c| c[1].to_string())
}

fn spawn_enrichment(
    pipeline: Arc<EnrichmentPipeline>,
    notifier: Option<Arc<dyn NotificationSink>>,
    message: &InboundMessage,
    image: ImagePayload,
    caption: &str,
) {
    let channel: ChannelKind = message.channel;
    let user_id = message.user_id.clone();
    let photo_id = message.id.clone();
    let hint = extract_component_tag(caption);

    tokio::spawn(async move {
        let result = pipeline
            .enrich_from_photo(image, hint.as_deref(), &photo_id)
            .await;
        let Some(notifier) = notifier else {
            warn!(photo_id = %photo_id, "enrichment finished but no notification sink is wired");
            return;
        };
        let mut notice = OutboundMessage {
            channel,
            user_id,
            text: format!("**KB Enrichment**\n\n{}", result.summary),
            attachments: Vec::new(),
            parse_mode: Default::default(),
            metadata: serde_json::Map::new(),
        };
        notice
            .metadata
            .insert("kind".into(), serde_json::json!("kb_enrichment"));
        notifier.notify(notice).await;
    });
}
