use axum::{extract::State, Json};
use serde_json::Value;
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — fan-out probe across connectors, aggregated into
/// `healthy`/`degraded`.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.connectors.aggregate_health().await)
}
