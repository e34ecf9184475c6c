//! Document generation published through the gist service.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use millwright_connectors::gist::GistFile;
use millwright_core::types::{InboundMessage, Intent, OutboundMessage};
use millwright_llm::provider::ChatMessage;
use millwright_llm::router::RouteRequest;

use crate::kb::kb_context;
use crate::skill::{
    llm_unavailable_reply, model_footer, tag_llm_response, Skill, SkillContext, SkillError,
};

const GIST_SYSTEM_PROMPT: &str = "\
You are a senior technical writer at an industrial automation company.

Your job: produce clear, structured markdown documents on demand.

Rules:
1. Output ONLY markdown - no conversational text, no preamble
2. Auto-detect document type from the request (PRD, research, build guide, \
technical specification, strategy document, general write-up)
3. Structure with clear headings, bullet points, numbered lists, and code blocks
4. Include an executive summary or TL;DR at the top for longer documents
5. Keep under 3000 words
6. Use industrial automation context when relevant (PLCs, SCADA, HMI, Modbus, OPC UA)
7. Include a metadata header: title, date, document type";

const USAGE: &str = "\
**Gist Skill** - generate documents and publish them.

**Usage:**
- `/gist research industrial IoT protocols`
- `/gist PRD for conveyor monitoring dashboard`
- `/gist build guide for Modbus TCP integration`
- `draft a strategy doc for edge AI deployment`";

static PREFIX_MAP: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bprd\b", "PRD_"),
        (r"(?i)\bresearch\b", "research_"),
        (r"(?i)\bbuild\s*guide\b", "build-guide_"),
        (r"(?i)\btechnical\s*spec\b", "spec_"),
        (r"(?i)\bstrategy\b", "strategy_"),
        (r"(?i)\bplaybook\b", "playbook_"),
        (r"(?i)\brunbook\b", "runbook_"),
        (r"(?i)\barchitecture\b", "architecture_"),
    ]
    .iter()
    .map(|(p, prefix)| (Regex::new(p).unwrap(), *prefix))
    .collect()
});

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\s]").unwrap());
static FILLER_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(a|an|the|for|of|on|in|to|and|or|with|about|create|write|draft|make|generate)\b")
        .unwrap()
});

/// Infer a descriptive filename from the request text.
fn infer_filename(prompt: &str) -> String {
    let mut prefix = "doc_";
    for (pattern, candidate) in PREFIX_MAP.iter() {
        if pattern.is_match(prompt) {
            prefix = candidate;
            break;
        }
    }

    let slug = NON_ALNUM.replace_all(prompt, "");
    let slug = FILLER_WORDS.replace_all(&slug, "");
    let words: Vec<String> = slug
        .split_whitespace()
        .take(5)
        .map(|w| w.to_lowercase())
        .collect();
    let slug = if words.is_empty() {
        "document".to_string()
    } else {
        words.join("-")
    };

    format!("{prefix}{slug}.md")
}

pub struct GistSkill;

#[async_trait]
impl Skill for GistSkill {
    fn name(&self) -> &'static str {
        "gist"
    }

    fn description(&self) -> &'static str {
        "Generate documents and publish them as gists"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Gist]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        let operators = &ctx.config.channels.allowed_users;
        if !operators.is_empty() && !operators.iter().any(|u| u == &message.user_id) {
            return Ok(OutboundMessage::reply_to(
                message,
                "Document publishing is restricted to listed operators.",
            ));
        }

        let mut request = message.text.trim();
        if let Some(stripped) = request.strip_prefix("/gist") {
            request = stripped.trim();
        }
        if request.is_empty() {
            return Ok(OutboundMessage::reply_to(message, USAGE));
        }

        let mut user_prompt = request.to_string();
        if let Some(kb) = &ctx.connectors.knowledge {
            if let Ok(atoms) = kb.search(request, 3).await {
                if !atoms.is_empty() {
                    user_prompt.push_str("\n\nRelevant knowledge base context:\n");
                    user_prompt.push_str(&kb_context(&atoms, 300));
                }
            }
        }

        let req = RouteRequest::new(Intent::Gist, vec![ChatMessage::user(user_prompt)])
            .system_prompt(GIST_SYSTEM_PROMPT)
            .max_tokens(4096)
            .temperature(0.4);
        let resp = match ctx.llm.route(req).await {
            Ok(r) => r,
            Err(e) => return Ok(llm_unavailable_reply(message, &e)),
        };

        let filename = infer_filename(request);
        let Some(gist) = &ctx.connectors.gist else {
            return Ok(OutboundMessage::reply_to(
                message,
                "Gist publishing is not configured. Set `connectors.gist_token` in millwright.toml.",
            ));
        };

        let files = [GistFile {
            name: filename.clone(),
            content: resp.text.clone(),
        }];
        let description = format!("[Millwright] {filename}");
        let handle = gist
            .create(&description, &files, true)
            .await
            .map_err(SkillError::Connector)?;

        let text = format!(
            "Document published: {}\n\n`{filename}`{}",
            handle.url,
            model_footer(&resp)
        );
        let mut out = OutboundMessage::reply_to(message, text);
        tag_llm_response(&mut out, &resp);
        Ok(out)
    }
}
