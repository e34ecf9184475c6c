//! WebSocket channel adapter.
//!
//! Frames in: `{"text": "...", "user_id": "...", "node_id": "..."}`.
//! Frames out: `{"type": "attachment", ...}` then `{"type": "text", ...}`
//! per reply, chunked to the platform limit. Attachments go first.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use base64::Engine;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};

use millwright_channels::allow::is_allowed;
use millwright_channels::channel::{Channel, ChannelError};
use millwright_channels::chunk::split_chunks;
use millwright_core::types::{ChannelKind, InboundMessage, OutboundMessage};

use crate::app::AppState;

/// Tracks connected WebSocket users so out-of-band messages (enrichment
/// notifications) can reach them.
pub struct WsChannel {
    clients: DashMap<String, mpsc::Sender<OutboundMessage>>,
}

impl WsChannel {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    fn attach(&self, user_id: &str, tx: mpsc::Sender<OutboundMessage>) {
        self.clients.insert(user_id.to_string(), tx);
    }

    fn detach(&self, user_id: &str) {
        self.clients.remove(user_id);
    }
}

#[async_trait]
impl Channel for WsChannel {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn start(&self) -> Result<(), ChannelError> {
        // connections arrive through the HTTP upgrade route
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        self.clients.clear();
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let tx = self
            .clients
            .get(&msg.user_id)
            .ok_or_else(|| ChannelError::NotConnected(msg.user_id.clone()))?
            .clone();
        tx.send(msg.clone())
            .await
            .map_err(|e| ChannelError::Send {
                channel: "websocket".to_string(),
                reason: e.to_string(),
            })
    }
}

#[derive(Deserialize)]
struct WsRequest {
    text: String,
    #[serde(default = "default_user")]
    user_id: String,
    #[serde(default)]
    node_id: String,
}

fn default_user() -> String {
    "ws-user".to_string()
}

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(16);

    // writer task: serialize outbound messages into frames, attachments
    // before text, text chunked
    let writer = tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            for attachment in &out.attachments {
                let frame = json!({
                    "type": "attachment",
                    "mime_type": attachment.mime_type,
                    "filename": attachment.filename,
                    "data": attachment
                        .data
                        .as_ref()
                        .map(|d| base64::engine::general_purpose::STANDARD.encode(d)),
                    "url": attachment.url,
                });
                if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                    return;
                }
            }
            for chunk in split_chunks(&out.text) {
                let frame = json!({"type": "text", "text": chunk});
                if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    });

    let mut attached_user: Option<String> = None;
    while let Some(Ok(frame)) = stream.next().await {
        let Message::Text(raw) = frame else {
            continue;
        };
        let req: WsRequest = match serde_json::from_str(&raw) {
            Ok(req) => req,
            Err(e) => {
                debug!(err = %e, "ignoring malformed ws frame");
                let _ = out_tx
                    .send(error_reply("Malformed frame; expected {\"text\": ...}"))
                    .await;
                continue;
            }
        };

        if !is_allowed(&state.config.channels.allowed_users, &req.user_id) {
            let _ = out_tx.send(error_reply("You are not on the allow-list.")).await;
            continue;
        }
        let (allowed, reset_secs) = state.rate_limiter.check(&req.user_id);
        if !allowed {
            let _ = out_tx
                .send(error_reply(&format!(
                    "Rate limit reached. Try again in {reset_secs}s."
                )))
                .await;
            continue;
        }

        // register for side-channel notifications on first valid frame
        if attached_user.as_deref() != Some(req.user_id.as_str()) {
            if let Some(previous) = attached_user.take() {
                state.ws_channel.detach(&previous);
            }
            state.ws_channel.attach(&req.user_id, out_tx.clone());
            attached_user = Some(req.user_id.clone());
            info!(user = %req.user_id, "websocket client attached");
        }

        let mut inbound = InboundMessage::new(ChannelKind::Websocket, &req.user_id, &req.text);
        if !req.node_id.is_empty() {
            inbound.node_id = Some(req.node_id.clone());
        }
        let history = state.history.get(&req.user_id);
        if !history.is_empty() {
            inbound
                .metadata
                .insert("history".into(), serde_json::to_value(&history).unwrap_or_default());
        }

        let reply = state.dispatcher.dispatch(inbound).await;
        state.history.add(&req.user_id, "user", &req.text);
        state.history.add(&req.user_id, "assistant", &reply.text);

        if out_tx.send(reply).await.is_err() {
            break;
        }
    }

    if let Some(user) = attached_user {
        state.ws_channel.detach(&user);
        info!(user = %user, "websocket client detached");
    }
    writer.abort();
    let _ = writer.await;
    debug!("websocket connection closed");
}

fn error_reply(text: &str) -> OutboundMessage {
    OutboundMessage {
        channel: ChannelKind::Websocket,
        user_id: String::new(),
        text: text.to_string(),
        attachments: Vec::new(),
        parse_mode: Default::default(),
        metadata: serde_json::Map::new(),
    }
}
