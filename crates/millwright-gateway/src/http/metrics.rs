use axum::{extract::State, Json};
use serde_json::Value;
use std::sync::Arc;

use crate::app::AppState;

/// GET /metrics — in-process counters.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.metrics.summary())
}
