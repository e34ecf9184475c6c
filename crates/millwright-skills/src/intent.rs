//! Rule-based intent classification.
//!
//! Order matters: image attachments, then empty text, then `/`-commands,
//! then the regex table (most specific first), then CHAT. Ambiguous verbs
//! like "repair" or "current" are deliberately not triggers — a wrong
//! specialist is worse than the chat skill.

use once_cell::sync::Lazy;
use regex::Regex;

use millwright_core::types::{InboundMessage, Intent};

const COMMAND_TABLE: &[(&str, Intent)] = &[
    ("/diagnose", Intent::Diagnose),
    ("/status", Intent::Status),
    ("/photo", Intent::Photo),
    ("/wo", Intent::WorkOrder),
    ("/workorder", Intent::WorkOrder),
    ("/admin", Intent::Admin),
    ("/health", Intent::Admin),
    ("/help", Intent::Help),
    ("/start", Intent::Help),
    ("/search", Intent::Search),
    ("/run", Intent::Shell),
    ("/diagram", Intent::Diagram),
    ("/wiring", Intent::Diagram),
    ("/gist", Intent::Gist),
    ("/project", Intent::Project),
];

static PATTERNS: Lazy<Vec<(Regex, Intent)>> = Lazy::new(|| {
    // specificity-first: explicit phrases before broad nouns
    let table: &[(&str, Intent)] = &[
        // explicit work-order phrases
        (
            r"(?i)\b(create|make|open|raise)\b.{0,20}\b(work\s*order|wo)\b",
            Intent::WorkOrder,
        ),
        // diagram / schematic terms
        (
            r"(?i)\b(wiring\s+diagram|schematic|diagram|wiring)\b",
            Intent::Diagram,
        ),
        // scaffold / bootstrap phrases
        (
            r"(?i)\b(scaffold|bootstrap|boilerplate)\b|\bnew\s+project\b|\bbuild\s+me\s+a\b",
            Intent::Project,
        ),
        // document-generation verbs
        (
            r"(?i)\b(write|draft|generate)\b.{0,20}\b(doc|document|prd|spec|research|report|guide|runbook|playbook)\b",
            Intent::Gist,
        ),
        // explicit fault words
        (
            r"(?i)\b(fault|alarm|error|broken|tripped|diagnose|diagnostic)\b",
            Intent::Diagnose,
        ),
        // "why" near stopped/fault
        (
            r"(?i)\bwhy\b.{0,30}\b(stopped|stopping|fault|down)\b",
            Intent::Diagnose,
        ),
        // equipment noun near stopped/down, either order
        (
            r"(?i)\b(conveyor|motor|machine|equipment|line|pump|vfd|plc)\b.{0,40}\b(stopped|down|not\s+running)\b",
            Intent::Diagnose,
        ),
        (
            r"(?i)\b(stopped|down)\b.{0,40}\b(conveyor|motor|machine|equipment|line|pump|vfd|plc)\b",
            Intent::Diagnose,
        ),
        // status / IO nouns
        (
            r"(?i)\b(status|tags?|readings?|temperature|temp|pressure|inputs?|outputs?|running)\b",
            Intent::Status,
        ),
        // broader work-order nouns
        (
            r"(?i)\b(work\s*order|maintenance|schedule)\b",
            Intent::WorkOrder,
        ),
        // admin nouns
        (
            r"(?i)\b(health|budget|restart|config|uptime|providers?)\b",
            Intent::Admin,
        ),
        // help verbs
        (
            r"(?i)\b(help|what\s+can\s+you|commands|menu)\b",
            Intent::Help,
        ),
        // search verbs
        (
            r"(?i)\b(search|look\s+up|google)\b",
            Intent::Search,
        ),
        // shell prefixes
        (r"(?i)^(\$\s|run\b|execute\b|shell\b)", Intent::Shell),
    ];
    table
        .iter()
        .map(|(pattern, intent)| (Regex::new(pattern).unwrap(), *intent))
        .collect()
});

/// Classify a message's intent. Pure, never fails; `Unknown` is the
/// sentinel for empty text.
pub fn classify(message: &InboundMessage) -> Intent {
    if message.has_image() {
        return Intent::Photo;
    }

    let text = message.text.trim();
    if text.is_empty() {
        return Intent::Unknown;
    }

    if text.starts_with('/') {
        let cmd = text
            .split_whitespace()
            .next()
            .unwrap_or(text)
            .to_lowercase();
        for (command, intent) in COMMAND_TABLE {
            if cmd == *command {
                return *intent;
            }
        }
        // unknown commands fall through to the pattern table
    }

    for (pattern, intent) in PATTERNS.iter() {
        if pattern.is_match(text) {
            return *intent;
        }
    }

    Intent::Chat
}
