//! The core value path: live telemetry + fault rules + KB + LLM into one
//! actionable answer. A high-confidence KB atom short-circuits the LLM
//! entirely (Layer 0).

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use millwright_connectors::knowledge::KbAtom;
use millwright_core::types::{InboundMessage, Intent, OutboundMessage};
use millwright_diagnosis::faults::{detect_faults, FaultDiagnosis, TagMap};
use millwright_diagnosis::prompts::{build_diagnosis_prompt, SYSTEM_PROMPT};
use millwright_llm::provider::ChatMessage;
use millwright_llm::router::RouteRequest;

use crate::kb::{
    atom_answer, atom_layer0_ready, kb_context, layer0_eligible, sources_block, LAYER0_FOOTER,
};
use crate::skill::{
    history_from_metadata, llm_unavailable_reply, model_footer, tag_llm_response, Skill,
    SkillContext, SkillError,
};

const DEFAULT_QUESTION: &str = "Why is this equipment stopped?";

pub struct DiagnoseSkill;

#[async_trait]
impl Skill for DiagnoseSkill {
    fn name(&self) -> &'static str {
        "diagnose"
    }

    fn description(&self) -> &'static str {
        "Diagnose equipment faults using live telemetry, fault rules, and the knowledge base"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Diagnose]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        let tags = latest_tags(message, ctx).await;
        let Some(tags) = tags else {
            return kb_only(message, ctx).await;
        };

        let faults = detect_faults(&tags);
        let top = &faults[0];
        let question = if message.text.trim().is_empty() {
            DEFAULT_QUESTION
        } else {
            message.text.trim()
        };

        let atoms = lookup_fault_atoms(ctx, top).await;

        // Layer-0 short-circuit: a known fault with a high-confidence,
        // actionable atom answers without any LLM call.
        if let Some(atom) = atoms.iter().find(|a| layer0_eligible(&top.fault_code, a)) {
            let text = format!(
                "{}\n\n{}{}{}",
                format_fault(top),
                atom_answer(atom),
                sources_block(&atoms),
                LAYER0_FOOTER
            );
            let mut out = OutboundMessage::reply_to(message, text);
            out.metadata.insert("layer".into(), json!("kb_direct"));
            return Ok(out);
        }

        let mut prompt = build_diagnosis_prompt(question, &tags, &faults);
        if !atoms.is_empty() {
            prompt.push_str("\n\nRELEVANT KNOWLEDGE BASE ENTRIES:\n");
            prompt.push_str(&kb_context(&atoms, 300));
        }

        let mut messages = history_from_metadata(message);
        messages.push(ChatMessage::user(prompt));
        let req = RouteRequest::new(Intent::Diagnose, messages).system_prompt(SYSTEM_PROMPT);

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

async fn latest_tags(message: &InboundMessage, ctx: &SkillContext) -> Option<TagMap> {
    let telemetry = ctx.connectors.telemetry.as_ref()?;
    match telemetry
        .get_latest_tags(message.node_id.as_deref(), 1)
        .await
    {
        Ok(rows) => rows.into_iter().next(),
        Err(e) => {
            warn!(err = %e, "telemetry unreachable");
            None
        }
    }
}

/// KB lookup keyed on the fault code, with full-text search on the fault
/// description as fallback.
async fn lookup_fault_atoms(ctx: &SkillContext, fault: &FaultDiagnosis) -> Vec<KbAtom> {
    let Some(kb) = &ctx.connectors.knowledge else {
        return Vec::new();
    };

    match kb.search_by_fault_code(&fault.fault_code, 3).await {
        Ok(atoms) if !atoms.is_empty() => return atoms,
        Ok(_) => {}
        Err(e) => warn!(err = %e, code = %fault.fault_code, "KB fault-code search failed"),
    }

    match kb.search(&fault.description, 3).await {
        Ok(atoms) => atoms,
        Err(e) => {
            warn!(err = %e, "KB full-text search failed");
            Vec::new()
        }
    }
}

/// Degraded branch when telemetry cannot be reached: answer from the KB,
/// with the LLM only when no atom is directly actionable.
async fn kb_only(
    message: &InboundMessage,
    ctx: &SkillContext,
) -> Result<OutboundMessage, SkillError> {
    let question = if message.text.trim().is_empty() {
        DEFAULT_QUESTION
    } else {
        message.text.trim()
    };

    let atoms = match &ctx.connectors.knowledge {
        Some(kb) => kb.search(question, 3).await.unwrap_or_default(),
        None => {
            return Ok(OutboundMessage::reply_to(
                message,
                "Cannot reach PLC telemetry, and no knowledge base is configured. \
                 Check that the telemetry API is running.",
            ))
        }
    };

    if let Some(atom) = atoms.iter().find(|a| atom_layer0_ready(a)) {
        let text = format!(
            "_Telemetry unreachable; answering from the knowledge base._\n\n{}{}{}",
            atom_answer(atom),
            sources_block(&atoms),
            LAYER0_FOOTER
        );
        let mut out = OutboundMessage::reply_to(message, text);
        out.metadata.insert("layer".into(), json!("kb_direct"));
        return Ok(out);
    }

    let mut prompt = format!(
        "PLC telemetry is currently unreachable, so no live tag values are available.\n\n\
         TECHNICIAN'S QUESTION:\n{question}"
    );
    if !atoms.is_empty() {
        prompt.push_str("\n\nRELEVANT KNOWLEDGE BASE ENTRIES:\n");
        prompt.push_str(&kb_context(&atoms, 300));
    }

    let mut messages = history_from_metadata(message);
    messages.push(ChatMessage::user(prompt.clone()));
    let req = RouteRequest::new(Intent::Diagnose, messages).system_prompt(SYSTEM_PROMPT);
    let resp = match ctx.llm.route(req).await {
        Ok(r) => r,
        // plant network may be cut off entirely; the air-gapped
        // maintenance LLM is the last inference option
        Err(e) => match maintenance_answer(ctx, &prompt).await {
            Some(text) => {
                let text = format!("{text}{}", sources_block(&atoms));
                return Ok(OutboundMessage::reply_to(message, text));
            }
            None => return Ok(llm_unavailable_reply(message, &e)),
        },
    };

    let text = format!("{}{}{}", resp.text, sources_block(&atoms), model_footer(&resp));
    let mut out = OutboundMessage::reply_to(message, text);
    tag_llm_response(&mut out, &resp);
    Ok(out)
}

/// Local inference through the maintenance LLM on the PLC laptop.
async fn maintenance_answer(ctx: &SkillContext, prompt: &str) -> Option<String> {
    let maintenance = ctx.connectors.maintenance.as_ref()?;
    match maintenance
        .generate(prompt, "llama3.2:3b", SYSTEM_PROMPT, 512)
        .await
    {
        Ok(reply) if !reply.response.trim().is_empty() => Some(format!(
            "{}\n\n_Model: {} (local) | {}ms_",
            reply.response, reply.model, reply.total_duration_ms
        )),
        Ok(_) => None,
        Err(e) => {
            warn!(err = %e, "maintenance LLM fallback failed");
            None
        }
    }
}

fn format_fault(fault: &FaultDiagnosis) -> String {
    format!(
        "**[{}] {}: {}**\n{}",
        fault.severity.as_str().to_uppercase(),
        fault.fault_code,
        fault.title,
        fault.description
    )
}
