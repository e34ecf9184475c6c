use async_trait::async_trait;

use millwright_core::types::OutboundMessage;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel `{channel}` failed to start: {reason}")]
    Start { channel: String, reason: String },

    #[error("channel `{channel}` failed to send: {reason}")]
    Send { channel: String, reason: String },

    #[error("recipient `{0}` is not connected")]
    NotConnected(String),

    #[error("no adapter registered for channel `{0}`")]
    UnknownChannel(String),
}

/// Common interface implemented by every channel adapter.
///
/// Adapters push inbound messages into the dispatcher themselves; the rest
/// of the system only ever calls `send`. An adapter is responsible for
/// allow-list enforcement, chunking replies to its platform limit, sending
/// attachments before text, and Markdown rendering with a plain-text retry.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier, matching `ChannelKind`'s string form.
    fn name(&self) -> &str;

    /// Start listening for messages.
    async fn start(&self) -> Result<(), ChannelError>;

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), ChannelError>;

    /// Deliver a single outbound message.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;
}
