//! Multi-file project scaffolds: one planning call (JSON), one generation
//! call per file, then a multi-file gist.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use millwright_connectors::gist::GistFile;
use millwright_core::types::{InboundMessage, Intent, OutboundMessage};
use millwright_enrich::json_repair::repair_and_parse;
use millwright_llm::provider::ChatMessage;
use millwright_llm::router::RouteRequest;

use crate::skill::{llm_unavailable_reply, tag_llm_response, Skill, SkillContext, SkillError};

/// Budget protection: at most 1 plan + 8 file calls per request.
const MAX_FILES: usize = 8;

const PLAN_PROMPT: &str = "\
You are a senior software architect at an industrial automation company.

Your job: design a project scaffold based on the user's request.

Output ONLY valid JSON with this exact schema - no markdown fences, no commentary:
{\"title\": \"short project title\", \"description\": \"1-2 sentence description\", \
\"tech_stack\": [\"python\", \"fastapi\"], \
\"files\": [{\"filename\": \"README.md\", \"description\": \"Project overview with setup instructions\"}]}

Rules:
1. Always include README.md as the first file
2. Include a dependency manifest (requirements.txt, package.json, Cargo.toml, etc.)
3. Include .gitignore appropriate for the tech stack
4. 3-8 files total
5. Infer the tech stack from the request
6. Use industrial automation context when relevant (PLCs, Modbus, MQTT, OPC UA)";

const USAGE: &str = "\
**Project Skill** - scaffold multi-file projects.

**Usage:**
- `/project FastAPI service for PLC tag monitoring`
- `/project Python CLI for Modbus scanning`
- `scaffold a React dashboard for conveyor status`";

pub struct ProjectSkill;

#[async_trait]
impl Skill for ProjectSkill {
    fn name(&self) -> &'static str {
        "project"
    }

    fn description(&self) -> &'static str {
        "Scaffold multi-file projects and publish them"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Project]
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
                "Project creation is restricted to listed operators.",
            ));
        }

        let mut request = message.text.trim();
        if let Some(stripped) = request.strip_prefix("/project") {
            request = stripped.trim();
        }
        for prefix in ["scaffold ", "build me ", "bootstrap "] {
            if request.to_lowercase().starts_with(prefix) {
                request = request[prefix.len()..].trim();
                break;
            }
        }
        if request.is_empty() {
            return Ok(OutboundMessage::reply_to(message, USAGE));
        }

        // phase 1: the plan
        let plan_req = RouteRequest::new(Intent::Project, vec![ChatMessage::user(request)])
            .system_prompt(PLAN_PROMPT)
            .max_tokens(1024)
            .json_mode(true);
        let plan_resp = match ctx.llm.route(plan_req).await {
            Ok(r) => r,
            Err(e) => return Ok(llm_unavailable_reply(message, &e)),
        };
        let Some(plan) = repair_and_parse(&plan_resp.text) else {
            return Err(SkillError::Parse("project plan was not valid JSON".into()));
        };

        let title = plan
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled Project")
            .to_string();
        let description = plan
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tech_stack: Vec<&str> = plan
            .get("tech_stack")
            .and_then(Value::as_array)
            .map(|s| s.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let file_specs: Vec<(String, String)> = plan
            .get("files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .filter_map(|f| {
                        let name = f.get("filename")?.as_str()?.to_string();
                        let purpose = f
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        Some((name, purpose))
                    })
                    .take(MAX_FILES)
                    .collect()
            })
            .unwrap_or_default();
        if file_specs.is_empty() {
            return Err(SkillError::Parse("project plan listed no files".into()));
        }

        // phase 2: one generation call per file
        let mut files: Vec<GistFile> = Vec::with_capacity(file_specs.len());
        for (filename, purpose) in &file_specs {
            let file_prompt = format!(
                "Project context:\n- Title: {title}\n- Description: {description}\n\
                 - Tech stack: {}\n\nGenerate the file: {filename}\nPurpose: {purpose}\n\n\
                 Rules:\n1. Output ONLY the file content - no markdown fences, no explanation\n\
                 2. Write functional, production-quality code\n3. Keep under 150 lines",
                tech_stack.join(", ")
            );
            let file_req = RouteRequest::new(Intent::Project, vec![ChatMessage::user(file_prompt)])
                .max_tokens(2048);
            match ctx.llm.route(file_req).await {
                Ok(resp) => files.push(GistFile {
                    name: filename.clone(),
                    content: strip_fences(&resp.text),
                }),
                Err(e) => {
                    warn!(file = %filename, err = %e, "file generation failed; skipping");
                }
            }
        }
        if files.is_empty() {
            return Err(SkillError::Other(
                "every file generation call failed".to_string(),
            ));
        }

        // phase 3: publish
        let Some(gist) = &ctx.connectors.gist else {
            let listing = files
                .iter()
                .map(|f| format!("- `{}`", f.name))
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(OutboundMessage::reply_to(
                message,
                format!(
                    "**{title}**\n\n{description}\n\nGenerated {} files but gist \
                     publishing is not configured:\n{listing}",
                    files.len()
                ),
            ));
        };
        let handle = gist
            .create(&format!("[Millwright Project] {title}"), &files, true)
            .await
            .map_err(SkillError::Connector)?;

        let listing = files
            .iter()
            .map(|f| format!("- `{}`", f.name))
            .collect::<Vec<_>>()
            .join("\n");
        let text = format!(
            "**{title}** published: {}\n\n{description}\n\nFiles:\n{listing}",
            handle.url
        );
        let mut out = OutboundMessage::reply_to(message, text);
        tag_llm_response(&mut out, &plan_resp);
        Ok(out)
    }
}

/// Models sometimes wrap file content in fences despite instructions.
fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let inner = match inner.split_once('\n') {
        Some((_lang, rest)) => rest,
        None => inner,
    };
    inner.strip_suffix("```").unwrap_or(inner).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_fences_handles_language_tags_and_plain_text() {
        assert_eq!(strip_fences("```python\nprint('hi')\n```"), "print('hi')");
        assert_eq!(strip_fences("plain content"), "plain content");
        assert_eq!(strip_fences("```\nx = 1\n```"), "x = 1");
    }
}
