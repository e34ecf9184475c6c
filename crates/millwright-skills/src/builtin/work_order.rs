//! Work orders from natural language: structured extraction via JSON mode,
//! then either a CMMS write or a portable Markdown + CSV document published
//! through the gist service.

use std::sync::Mutex;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::warn;

use millwright_connectors::cmms::WorkOrderRequest;
use millwright_connectors::gist::GistFile;
use millwright_core::types::{InboundMessage, Intent, OutboundMessage};
use millwright_enrich::json_repair::repair_and_parse;
use millwright_llm::provider::ChatMessage;
use millwright_llm::router::RouteRequest;

use crate::skill::{
    llm_unavailable_reply, model_footer, tag_llm_response, Skill, SkillContext, SkillError,
};

const EXTRACTION_PROMPT: &str = "\
Extract a maintenance work order from the user's message. Return JSON with keys: \
title (short), description (detailed), priority (HIGH/MEDIUM/LOW), \
asset_name, asset_id (number or null), location, work_type, category, failure_code. \
Use null for anything the message does not state.";

const CSV_COLUMNS: &[&str] = &[
    "work_order_id",
    "title",
    "status",
    "priority",
    "asset_name",
    "asset_id",
    "location",
    "site",
    "assigned_to",
    "assigned_team",
    "work_type",
    "category",
    "due_date",
    "created_date",
    "completed_date",
    "completed_by",
    "reported_by",
    "channel",
    "estimated_hours",
    "cost",
    "completion_notes",
    "failure_code",
    "description",
    "cmms_system",
    "cmms_external_id",
];

/// Daily sequence for portable work-order IDs. Process-local by design —
/// there is no cross-process scheduling to coordinate with.
static WO_SEQ: Lazy<Mutex<(String, u32)>> = Lazy::new(|| Mutex::new((String::new(), 0)));

/// `WO-YYYY-MMDD-NNN`, sequence resetting daily.
fn generate_wo_id() -> String {
    let now = chrono::Local::now();
    let day = now.format("%Y%m%d").to_string();
    let mut guard = WO_SEQ.lock().unwrap();
    if guard.0 != day {
        *guard = (day, 0);
    }
    guard.1 += 1;
    format!("WO-{}-{}-{:03}", now.format("%Y"), now.format("%m%d"), guard.1)
}

#[derive(Debug, Clone, Default)]
struct WoFields {
    title: String,
    description: String,
    priority: String,
    asset_name: String,
    asset_id: Option<i64>,
    location: String,
    work_type: String,
    category: String,
    failure_code: String,
}

impl WoFields {
    /// Lenient extraction: the model is asked for JSON but tolerated when
    /// it strays. Anything missing falls back to a default record built
    /// from the raw message.
    fn from_model_output(text: &str, original: &str) -> Self {
        let fallback = || Self {
            title: original.chars().take(100).collect(),
            description: original.to_string(),
            priority: "MEDIUM".to_string(),
            ..Default::default()
        };

        let Some(value) = repair_and_parse(text) else {
            warn!("work-order extraction returned unparseable JSON; using fallback record");
            return fallback();
        };

        let str_of = |key: &str| -> String {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let mut fields = Self {
            title: str_of("title"),
            description: str_of("description"),
            priority: str_of("priority").to_uppercase(),
            asset_name: str_of("asset_name"),
            asset_id: value.get("asset_id").and_then(Value::as_i64),
            location: str_of("location"),
            work_type: str_of("work_type"),
            category: str_of("category"),
            failure_code: str_of("failure_code"),
        };
        if fields.title.is_empty() {
            fields.title = fallback().title;
        }
        if fields.description.is_empty() {
            fields.description = original.to_string();
        }
        if !matches!(fields.priority.as_str(), "HIGH" | "MEDIUM" | "LOW") {
            fields.priority = "MEDIUM".to_string();
        }
        fields
    }
}

pub struct WorkOrderSkill;

#[async_trait]
impl Skill for WorkOrderSkill {
    fn name(&self) -> &'static str {
        "work_order"
    }

    fn description(&self) -> &'static str {
        "Create work orders from natural language"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::WorkOrder]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        let req = RouteRequest::new(
            Intent::WorkOrder,
            vec![ChatMessage::user(message.text.clone())],
        )
        .system_prompt(EXTRACTION_PROMPT)
        .json_mode(true);
        let resp = match ctx.llm.route(req).await {
            Ok(r) => r,
            Err(e) => return Ok(llm_unavailable_reply(message, &e)),
        };

        let fields = WoFields::from_model_output(&resp.text, &message.text);

        // CMMS first; portable-document mode when it is absent or failing.
        if let Some(cmms) = &ctx.connectors.cmms {
            let request = WorkOrderRequest {
                title: fields.title.clone(),
                description: fields.description.clone(),
                priority: fields.priority.clone(),
                asset_id: fields.asset_id,
            };
            match cmms.create_work_order(&request).await {
                Ok(result) => {
                    let wo_id = result
                        .get("id")
                        .map(|v| v.to_string().trim_matches('"').to_string())
                        .unwrap_or_else(|| "?".to_string());
                    let text = format!(
                        "Work order created: #{wo_id}\n\n**{}**\nPriority: {}{}",
                        fields.title,
                        fields.priority,
                        model_footer(&resp)
                    );
                    let mut out = OutboundMessage::reply_to(message, text);
                    tag_llm_response(&mut out, &resp);
                    return Ok(out);
                }
                Err(e) => {
                    warn!(err = %e, "CMMS write failed; falling back to portable work order");
                }
            }
        }

        portable_work_order(message, ctx, &fields, &resp).await
    }
}

/// Portable, CMMS-agnostic work order: Markdown + CSV + attachments
/// manifest, published as a gist any CMMS can import.
async fn portable_work_order(
    message: &InboundMessage,
    ctx: &SkillContext,
    fields: &WoFields,
    resp: &millwright_llm::provider::LlmResponse,
) -> Result<OutboundMessage, SkillError> {
    let wo_id = generate_wo_id();
    let created = chrono::Local::now().to_rfc3339();

    let markdown = render_markdown(&wo_id, fields, message, &created);
    let csv = render_csv(&wo_id, fields, message, &created);
    let manifest = "type,description,url\n".to_string();

    let Some(gist) = &ctx.connectors.gist else {
        // no publisher: hand the document back inline
        let text = format!(
            "CMMS is not configured; here is a portable work order you can import.\n\n{markdown}"
        );
        let mut out = OutboundMessage::reply_to(message, text);
        tag_llm_response(&mut out, resp);
        return Ok(out);
    };

    let files = [
        GistFile {
            name: "work-order.md".to_string(),
            content: markdown,
        },
        GistFile {
            name: "work-order.csv".to_string(),
            content: csv,
        },
        GistFile {
            name: "attachments.txt".to_string(),
            content: manifest,
        },
    ];
    let description = format!("[Millwright Work Order] {wo_id} - {}", fields.title);

    let handle = gist
        .create(&description, &files, true)
        .await
        .map_err(SkillError::Connector)?;

    let text = format!(
        "Portable work order **{wo_id}** published: {}\n\n**{}**\nPriority: {}{}",
        handle.url,
        fields.title,
        fields.priority,
        model_footer(resp)
    );
    let mut out = OutboundMessage::reply_to(message, text);
    tag_llm_response(&mut out, resp);
    Ok(out)
}

fn render_markdown(
    wo_id: &str,
    fields: &WoFields,
    message: &InboundMessage,
    created: &str,
) -> String {
    let asset = match fields.asset_id {
        Some(id) if !fields.asset_name.is_empty() => format!("{} (#{id})", fields.asset_name),
        Some(id) => format!("#{id}"),
        None => fields.asset_name.clone(),
    };
    format!(
        "# Work Order {wo_id}\n\n\
         **Title:** {}\n\
         **Status:** OPEN\n\
         **Priority:** {}\n\
         **Asset:** {}\n\
         **Location:** {}\n\
         **Work Type:** {}\n\
         **Category:** {}\n\
         **Failure Code:** {}\n\
         **Reported By:** {}\n\
         **Channel:** {}\n\
         **Created:** {created}\n\n\
         ## Description\n\n{}\n\n\
         ## Attachments\n\nNone\n",
        fields.title,
        fields.priority,
        asset,
        fields.location,
        fields.work_type,
        fields.category,
        fields.failure_code,
        message.user_id,
        message.channel,
        fields.description,
    )
}

fn render_csv(wo_id: &str, fields: &WoFields, message: &InboundMessage, created: &str) -> String {
    let mut values: Vec<(&str, String)> = CSV_COLUMNS.iter().map(|c| (*c, String::new())).collect();
    let mut set = |key: &str, value: String| {
        if let Some(slot) = values.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        }
    };
    set("work_order_id", wo_id.to_string());
    set("title", fields.title.clone());
    set("status", "OPEN".to_string());
    set("priority", fields.priority.clone());
    set("asset_name", fields.asset_name.clone());
    set(
        "asset_id",
        fields.asset_id.map(|id| id.to_string()).unwrap_or_default(),
    );
    set("location", fields.location.clone());
    set("work_type", fields.work_type.clone());
    set("category", fields.category.clone());
    set("created_date", created.to_string());
    set("reported_by", message.user_id.clone());
    set("channel", message.channel.to_string());
    set("failure_code", fields.failure_code.clone());
    set("description", fields.description.clone());

    let header = CSV_COLUMNS.join(",");
    let row = values
        .iter()
        .map(|(_, v)| csv_escape(v))
        .collect::<Vec<_>>()
        .join(",");
    format!("{header}\n{row}\n")
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
