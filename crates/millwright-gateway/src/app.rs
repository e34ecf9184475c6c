//! Shared application state and the Axum router.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use millwright_channels::{ChannelManager, ConversationStore, RateLimiter};
use millwright_connectors::Connectors;
use millwright_core::config::MillwrightConfig;
use millwright_core::metrics::MetricsCollector;
use millwright_skills::Dispatcher;

use crate::ws::WsChannel;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Central shared state, passed as `Arc<AppState>` to every handler.
pub struct AppState {
    pub config: Arc<MillwrightConfig>,
    pub dispatcher: Arc<Dispatcher>,
    pub connectors: Connectors,
    pub metrics: Arc<MetricsCollector>,
    pub history: Arc<ConversationStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub channels: Arc<ChannelManager>,
    pub ws_channel: Arc<WsChannel>,
    /// Provider names at startup, for the root endpoint.
    pub provider_names: Vec<String>,
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(crate::http::root::root_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/metrics", get(crate::http::metrics::metrics_handler));

    if state.config.channels.http_api_enabled {
        router = router
            .route("/api/v1/message", post(crate::http::message::send_message))
            .route("/api/v1/diagnose", post(crate::http::message::diagnose));
    }
    if state.config.channels.websocket_enabled {
        router = router.route("/ws", get(crate::ws::ws_handler));
    }

    router
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
}
