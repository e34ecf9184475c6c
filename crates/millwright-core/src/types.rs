use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the user is asking for. Closed set — every inbound message maps to
/// exactly one intent, with `Unknown` as the classifier's sentinel.
///
/// `WiringReconstruct` and `KbEnrich` never come from the classifier; they
/// exist so the enrichment pipeline can be routed through the same
/// intent-keyed LLM routing table as user traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Diagnose,
    Status,
    Photo,
    WorkOrder,
    Chat,
    Admin,
    Help,
    Search,
    Shell,
    Diagram,
    Gist,
    Project,
    Unknown,
    WiringReconstruct,
    KbEnrich,
}

impl Intent {
    /// Stable snake_case identifier used in config keys, logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Diagnose => "diagnose",
            Intent::Status => "status",
            Intent::Photo => "photo",
            Intent::WorkOrder => "work_order",
            Intent::Chat => "chat",
            Intent::Admin => "admin",
            Intent::Help => "help",
            Intent::Search => "search",
            Intent::Shell => "shell",
            Intent::Diagram => "diagram",
            Intent::Gist => "gist",
            Intent::Project => "project",
            Intent::Unknown => "unknown",
            Intent::WiringReconstruct => "wiring_reconstruct",
            Intent::KbEnrich => "kb_enrich",
        }
    }

    /// Parse the snake_case form back into an intent (config route keys).
    pub fn parse(s: &str) -> Option<Intent> {
        Some(match s {
            "diagnose" => Intent::Diagnose,
            "status" => Intent::Status,
            "photo" => Intent::Photo,
            "work_order" => Intent::WorkOrder,
            "chat" => Intent::Chat,
            "admin" => Intent::Admin,
            "help" => Intent::Help,
            "search" => Intent::Search,
            "shell" => Intent::Shell,
            "diagram" => Intent::Diagram,
            "gist" => Intent::Gist,
            "project" => Intent::Project,
            "unknown" => Intent::Unknown,
            "wiring_reconstruct" => Intent::WiringReconstruct,
            "kb_enrich" => Intent::KbEnrich,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingress channel a message arrived on (and the reply leaves on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Telegram,
    Whatsapp,
    HttpApi,
    Websocket,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelKind::Telegram => "telegram",
            ChannelKind::Whatsapp => "whatsapp",
            ChannelKind::HttpApi => "http_api",
            ChannelKind::Websocket => "websocket",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
    Document,
}

/// Media attached to a message. Either raw bytes or a URL is present; the
/// channel adapter decides which it can supply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Attachment {
    pub fn image(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            kind: AttachmentKind::Image,
            data: Some(data),
            url: String::new(),
            mime_type: mime_type.into(),
            filename: None,
        }
    }
}

/// Formatting hint for outbound message content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    #[default]
    Markdown,
    Plain,
}

/// A message received from a channel, normalized for dispatch.
///
/// `metadata` is free-form; channel adapters use it to inject conversation
/// history (`metadata.history` as `[{role, content}]`) — the dispatch core
/// itself never touches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub channel: ChannelKind,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "unknown_intent")]
    pub intent: Intent,
    #[serde(default)]
    pub node_id: Option<String>,
}

fn unknown_intent() -> Intent {
    Intent::Unknown
}

impl InboundMessage {
    pub fn new(channel: ChannelKind, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel,
            user_id: user_id.into(),
            user_name: None,
            text: text.into(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
            intent: Intent::Unknown,
            node_id: None,
        }
    }

    /// True when any attachment is an image.
    pub fn has_image(&self) -> bool {
        self.attachments
            .iter()
            .any(|a| a.kind == AttachmentKind::Image)
    }
}

/// A reply headed back to a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: ChannelKind,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub parse_mode: ParseMode,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl OutboundMessage {
    /// Build a plain text reply addressed to the sender of `msg`.
    ///
    /// Every reply produced by the dispatcher goes through here (or a
    /// manual construction copying the same two fields), which is what
    /// keeps channel and user_id stable across a dispatch.
    pub fn reply_to(msg: &InboundMessage, text: impl Into<String>) -> Self {
        Self {
            channel: msg.channel,
            user_id: msg.user_id.clone(),
            text: text.into(),
            attachments: Vec::new(),
            parse_mode: ParseMode::Markdown,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}
