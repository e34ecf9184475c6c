use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::{AppState, VERSION};

/// GET / — name, version, configured providers and skills.
pub async fn root_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "name": "millwright",
        "version": VERSION,
        "providers": state.provider_names,
        "skills": state.dispatcher.registry().skill_names(),
        "channels": state.channels.names(),
    }))
}
