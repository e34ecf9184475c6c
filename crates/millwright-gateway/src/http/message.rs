//! Programmatic message ingress — POST /api/v1/message and /api/v1/diagnose.
//!
//! This is the HTTP channel adapter: it enforces the allow-list and rate
//! limit, injects conversation history via `metadata.history`, and records
//! both turns after dispatch.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use millwright_channels::allow::is_allowed;
use millwright_core::types::{ChannelKind, InboundMessage, Intent};

use crate::app::AppState;
use crate::auth::check_api_key;

#[derive(Deserialize)]
pub struct MessageRequest {
    pub text: String,
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default)]
    pub node_id: String,
}

fn default_user() -> String {
    "api-user".to_string()
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub text: String,
    pub intent: String,
    pub model: String,
    pub latency_ms: u64,
}

type HandlerError = (StatusCode, Json<Value>);

/// POST /api/v1/message — normal dispatch with classification.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, HandlerError> {
    run_dispatch(state, headers, req, None).await
}

/// POST /api/v1/diagnose — same body, intent forced to DIAGNOSE.
pub async fn diagnose(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, HandlerError> {
    if req.text.trim().is_empty() {
        req.text = "Why is this equipment stopped?".to_string();
    }
    run_dispatch(state, headers, req, Some(Intent::Diagnose)).await
}

async fn run_dispatch(
    state: Arc<AppState>,
    headers: HeaderMap,
    req: MessageRequest,
    forced_intent: Option<Intent>,
) -> Result<Json<MessageResponse>, HandlerError> {
    if !check_api_key(&state.config, &headers) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid or missing X-Api-Key"})),
        ));
    }
    if !is_allowed(&state.config.channels.allowed_users, &req.user_id) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({"error": "user is not on the allow-list"})),
        ));
    }
    let (allowed, reset_secs) = state.rate_limiter.check(&req.user_id);
    if !allowed {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "rate limit reached", "retry_after_secs": reset_secs})),
        ));
    }

    let mut inbound = InboundMessage::new(ChannelKind::HttpApi, &req.user_id, &req.text);
    if !req.node_id.is_empty() {
        inbound.node_id = Some(req.node_id.clone());
    }
    if let Some(intent) = forced_intent {
        inbound.intent = intent;
    }
    let history = state.history.get(&req.user_id);
    if !history.is_empty() {
        inbound.metadata.insert(
            "history".into(),
            serde_json::to_value(&history).unwrap_or_default(),
        );
    }

    let reply = state.dispatcher.dispatch(inbound).await;
    state.history.add(&req.user_id, "user", &req.text);
    state.history.add(&req.user_id, "assistant", &reply.text);

    Ok(Json(MessageResponse {
        text: reply.text.clone(),
        intent: reply
            .metadata
            .get("intent")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        model: reply
            .metadata
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        latency_ms: reply
            .metadata
            .get("latency_ms")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    }))
}
