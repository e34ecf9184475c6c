//! Read-only operational summaries: connector health, provider
//! availability and circuit state, LLM budget.

use async_trait::async_trait;
use serde_json::Value;

use millwright_core::types::{InboundMessage, Intent, OutboundMessage};

use crate::skill::{Skill, SkillContext, SkillError};

pub struct AdminSkill;

#[async_trait]
impl Skill for AdminSkill {
    fn name(&self) -> &'static str {
        "admin"
    }

    fn description(&self) -> &'static str {
        "System health, budget, and connector status"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Admin]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        let text = message.text.to_lowercase();

        if text.contains("budget") {
            return Ok(OutboundMessage::reply_to(message, budget_report(ctx)));
        }

        Ok(OutboundMessage::reply_to(message, health_report(ctx).await))
    }
}

fn budget_report(ctx: &SkillContext) -> String {
    let summary = ctx.llm.budget().summary();
    let mut lines = vec!["**LLM Budget**".to_string(), String::new()];

    let Some(providers) = summary.as_object() else {
        return lines.join("\n");
    };
    if providers.is_empty() {
        lines.push("  No budgets configured (all providers unlimited).".to_string());
        return lines.join("\n");
    }
    for (provider, data) in providers {
        let used = data
            .get("requests_today")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let limit = data
            .get("daily_request_limit")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let within = data
            .get("within_budget")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let limit_str = if limit == 0 {
            "unlimited".to_string()
        } else {
            limit.to_string()
        };
        let status = if within { "within budget" } else { "OVER BUDGET" };
        lines.push(format!("  {provider}: {used}/{limit_str} requests ({status})"));
    }
    lines.join("\n")
}

async fn health_report(ctx: &SkillContext) -> String {
    let mut lines = vec!["**Millwright Health**".to_string(), String::new()];

    let health = ctx.connectors.aggregate_health().await;
    if let Some(connectors) = health.get("connectors").and_then(Value::as_object) {
        if connectors.is_empty() {
            lines.push("  No connectors configured.".to_string());
        }
        for (name, detail) in connectors {
            let status = detail
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("see detail");
            lines.push(format!("  {name}: {status}"));
        }
    }

    lines.push(String::new());
    lines.push("**LLM Providers**".to_string());
    let circuits = ctx.llm.health().snapshot();
    for (name, available) in ctx.llm.provider_names() {
        let mut status = if available { "available" } else { "no key" }.to_string();
        if let Some(snap) = circuits.iter().find(|c| c.name == name) {
            if snap.circuit_open_secs > 0 {
                status = format!("circuit open ({}s left)", snap.circuit_open_secs);
            } else if snap.consecutive_failures > 0 {
                status.push_str(&format!(", {} recent failures", snap.consecutive_failures));
            }
        }
        lines.push(format!("  {name}: {status}"));
    }

    lines.join("\n")
}
