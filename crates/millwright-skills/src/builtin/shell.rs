//! Remote command execution, gated by the operator allow-list.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use millwright_core::types::{InboundMessage, Intent, OutboundMessage};

use crate::skill::{Skill, SkillContext, SkillError};

/// `@host` target embedded in the command text.
static HOST_TARGET: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9_-]+)\s+").unwrap());

const USAGE: &str = "Usage: `$ <command>` or `/run <command>`\nTarget a host: `$ @plc ls /home`";

pub struct ShellSkill;

#[async_trait]
impl Skill for ShellSkill {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn description(&self) -> &'static str {
        "Execute commands on connected maintenance hosts"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Shell]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        // Shell requires a closed operator list; an empty allow-list means
        // no one runs commands.
        let operators = &ctx.config.channels.allowed_users;
        if operators.is_empty() || !operators.iter().any(|u| u == &message.user_id) {
            return Ok(OutboundMessage::reply_to(
                message,
                "Shell access is restricted to listed operators.",
            ));
        }

        let (command, host) = parse_command(&message.text);
        if command.is_empty() {
            return Ok(OutboundMessage::reply_to(message, USAGE));
        }

        let Some(shell) = &ctx.connectors.shell else {
            return Ok(OutboundMessage::reply_to(
                message,
                "No shell hosts configured. Set `connectors.shell_hosts` in millwright.toml.",
            ));
        };

        let result = match shell.execute(&command, host.as_deref(), 30).await {
            Ok(result) => result,
            Err(e) => {
                warn!(err = %e, command = %command, "shell execution failed");
                return Ok(OutboundMessage::reply_to(
                    message,
                    format!("Shell error: `{e}`"),
                ));
            }
        };

        let mut parts: Vec<String> = Vec::new();
        if !result.stdout.is_empty() {
            parts.push(format!("```\n{}\n```", result.stdout.trim_end()));
        }
        if !result.stderr.is_empty() {
            parts.push(format!("**stderr:**\n```\n{}\n```", result.stderr.trim_end()));
        }
        if let Some(code) = result.exit_code {
            if code != 0 {
                parts.push(format!("Exit code: {code}"));
            }
        }

        let mut text = if parts.is_empty() {
            "_Command completed with no output._".to_string()
        } else {
            parts.join("\n")
        };
        if let Some(host) = host {
            text = format!("**@{host}**\n{text}");
        }

        Ok(OutboundMessage::reply_to(message, text))
    }
}

/// Strip the `/run` and `$` prefixes, pull out an optional `@host` target.
fn parse_command(text: &str) -> (String, Option<String>) {
    let mut command = text.trim().to_string();

    if command.to_lowercase().starts_with("/run") {
        command = command[4..].trim().to_string();
    }
    if let Some(stripped) = command.strip_prefix('$') {
        command = stripped.trim().to_string();
    }

    let mut host = None;
    if let Some(captures) = HOST_TARGET.captures(&command) {
        host = Some(captures[1].to_lowercase());
        let full = captures.get(0).unwrap();
        command.replace_range(full.range(), "");
        command = command.trim().to_string();
    }

    (command, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_run_and_dollar_prefixes() {
        assert_eq!(parse_command("/run uptime"), ("uptime".to_string(), None));
        assert_eq!(parse_command("$ df -h"), ("df -h".to_string(), None));
        assert_eq!(parse_command("$df -h"), ("df -h".to_string(), None));
    }

    #[test]
    fn extracts_host_target() {
        let (cmd, host) = parse_command("$ @plc ls /home");
        assert_eq!(cmd, "ls /home");
        assert_eq!(host.as_deref(), Some("plc"));

        let (cmd, host) = parse_command("/run @Travel journalctl -n 20");
        assert_eq!(cmd, "journalctl -n 20");
        assert_eq!(host.as_deref(), Some("travel"));
    }

    #[test]
    fn empty_command_yields_usage() {
        assert_eq!(parse_command("/run").0, "");
        assert_eq!(parse_command("$").0, "");
    }
}
