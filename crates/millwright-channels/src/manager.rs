//! Registry of running channel adapters, keyed by channel name.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use millwright_core::types::OutboundMessage;

use crate::channel::{Channel, ChannelError};

#[derive(Default)]
pub struct ChannelManager {
    channels: DashMap<String, Arc<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn register(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registered channel adapter");
        self.channels.insert(name, channel);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub async fn start_all(&self) {
        for entry in self.channels.iter() {
            if let Err(e) = entry.value().start().await {
                warn!(channel = %entry.key(), err = %e, "channel failed to start");
            }
        }
    }

    pub async fn stop_all(&self) {
        for entry in self.channels.iter() {
            if let Err(e) = entry.value().stop().await {
                warn!(channel = %entry.key(), err = %e, "channel failed to stop");
            }
        }
    }

    /// Deliver `msg` through the adapter for its channel.
    pub async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let name = msg.channel.to_string();
        let channel = self
            .channels
            .get(&name)
            .ok_or_else(|| ChannelError::UnknownChannel(name.clone()))?;
        channel.send(msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use millwright_core::types::{ChannelKind, InboundMessage};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubChannel {
        name: &'static str,
        sent: AtomicU32,
    }

    #[async_trait]
    impl Channel for StubChannel {
        fn name(&self) -> &str {
            self.name
        }
        async fn start(&self) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn send(&self, _msg: &OutboundMessage) -> Result<(), ChannelError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_routes_by_channel_kind() {
        let manager = ChannelManager::new();
        let ws = Arc::new(StubChannel {
            name: "websocket",
            sent: AtomicU32::new(0),
        });
        manager.register(ws.clone());

        let inbound = InboundMessage::new(ChannelKind::Websocket, "u", "hi");
        let reply = OutboundMessage::reply_to(&inbound, "hello");
        manager.send(&reply).await.unwrap();
        assert_eq!(ws.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let manager = ChannelManager::new();
        let inbound = InboundMessage::new(ChannelKind::Telegram, "u", "hi");
        let reply = OutboundMessage::reply_to(&inbound, "hello");
        assert!(matches!(
            manager.send(&reply).await,
            Err(ChannelError::UnknownChannel(_))
        ));
    }
}
