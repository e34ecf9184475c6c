//! Component wiring — everything is built once at startup, leaves first:
//! providers and budget, then the router, connectors, skills, and finally
//! the dispatcher. No global registries; the dispatcher closes over its
//! collaborators through `SkillContext`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use millwright_channels::{ChannelManager, ConversationStore, RateLimiter};
use millwright_connectors::cmms::CmmsConnector;
use millwright_connectors::gist::GistConnector;
use millwright_connectors::knowledge::{KnowledgeConnector, KnowledgeStore};
use millwright_connectors::maintenance::MaintenanceLlmConnector;
use millwright_connectors::renderer::RendererConnector;
use millwright_connectors::shell::ShellConnector;
use millwright_connectors::telemetry::TelemetryConnector;
use millwright_connectors::Connectors;
use millwright_core::config::MillwrightConfig;
use millwright_core::metrics::MetricsCollector;
use millwright_core::types::{Intent, OutboundMessage};
use millwright_enrich::EnrichmentPipeline;
use millwright_llm::anthropic::AnthropicProvider;
use millwright_llm::budget::BudgetTracker;
use millwright_llm::openai_compat::OpenAiCompatProvider;
use millwright_llm::provider::LlmProvider;
use millwright_llm::router::{default_routes, LlmRouter, Route};
use millwright_skills::{Dispatcher, NotificationSink, SkillContext, SkillRegistry};

use crate::app::AppState;
use crate::ws::WsChannel;

/// Notification sink backed by the channel manager: enrichment and other
/// side-channel messages go out through whichever adapter owns the
/// message's channel.
struct ChannelNotifier {
    channels: Arc<ChannelManager>,
}

#[async_trait]
impl NotificationSink for ChannelNotifier {
    async fn notify(&self, message: OutboundMessage) {
        if let Err(e) = self.channels.send(&message).await {
            warn!(err = %e, channel = %message.channel, "notification not delivered");
        }
    }
}

pub fn build_state(config: MillwrightConfig) -> Arc<AppState> {
    let config = Arc::new(config);

    // ── LLM providers + budget ───────────────────────────────────────────────
    let budget = BudgetTracker::new();
    let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();

    for entry in &config.providers.compat {
        match OpenAiCompatProvider::from_entry(entry) {
            Ok(provider) => {
                if entry.daily_request_limit > 0 || entry.daily_token_limit > 0 {
                    budget.configure(&entry.id, entry.daily_request_limit, entry.daily_token_limit);
                }
                providers.insert(entry.id.clone(), Arc::new(provider));
            }
            Err(e) => warn!(provider = %entry.id, "skipping provider: {}", e),
        }
    }
    if let Some(anthropic) = &config.providers.anthropic {
        if anthropic.daily_request_limit > 0 || anthropic.daily_token_limit > 0 {
            budget.configure(
                "anthropic",
                anthropic.daily_request_limit,
                anthropic.daily_token_limit,
            );
        }
        providers.insert(
            "anthropic".to_string(),
            Arc::new(AnthropicProvider::new(
                anthropic.api_key.clone(),
                anthropic.model.clone(),
                None,
            )),
        );
    }

    // routing table: compiled-in defaults, overridden per intent from config
    let mut routes = default_routes();
    for (key, route) in &config.routes {
        match Intent::parse(key) {
            Some(intent) => {
                routes.insert(
                    intent,
                    Route {
                        primary: route.primary.clone(),
                        fallbacks: route.fallbacks.clone(),
                    },
                );
            }
            None => warn!(key, "ignoring route override for unknown intent"),
        }
    }

    let provider_names: Vec<String> = {
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    };
    let router = Arc::new(LlmRouter::new(providers, budget, routes));

    // ── Connectors ───────────────────────────────────────────────────────────
    let cc = &config.connectors;
    let knowledge: Option<Arc<dyn KnowledgeStore>> = cc
        .kb_url
        .as_deref()
        .map(|url| Arc::new(KnowledgeConnector::new(url)) as Arc<dyn KnowledgeStore>);
    let connectors = Connectors {
        knowledge: knowledge.clone(),
        telemetry: cc
            .telemetry_url
            .as_deref()
            .map(|url| Arc::new(TelemetryConnector::new(url)) as _),
        cmms: cc.cmms_url.as_deref().map(|url| {
            Arc::new(CmmsConnector::new(
                url,
                cc.cmms_email.as_deref().unwrap_or(""),
                cc.cmms_password.as_deref().unwrap_or(""),
            )) as _
        }),
        shell: (!cc.shell_hosts.is_empty())
            .then(|| Arc::new(ShellConnector::new(cc.shell_hosts.clone())) as _),
        maintenance: cc
            .maintenance_url
            .as_deref()
            .map(|url| Arc::new(MaintenanceLlmConnector::new(url)) as _),
        gist: cc
            .gist_token
            .as_deref()
            .map(|token| Arc::new(GistConnector::new(token)) as _),
        renderer: cc
            .renderer_url
            .as_deref()
            .map(|url| Arc::new(RendererConnector::new(url)) as _),
    };

    // ── Channels ─────────────────────────────────────────────────────────────
    let channels = Arc::new(ChannelManager::new());
    let ws_channel = Arc::new(WsChannel::new());
    if config.channels.websocket_enabled {
        channels.register(ws_channel.clone());
    }

    // ── Skills + dispatcher ──────────────────────────────────────────────────
    let metrics = Arc::new(MetricsCollector::new());
    let enrichment = Arc::new(EnrichmentPipeline::new(router.clone(), knowledge));

    let ctx = SkillContext {
        llm: router,
        connectors: connectors.clone(),
        config: config.clone(),
        metrics: metrics.clone(),
        notifier: Some(Arc::new(ChannelNotifier {
            channels: channels.clone(),
        })),
        enrichment: Some(enrichment),
    };

    let mut registry = SkillRegistry::new();
    registry.register_builtins(&config.skills.disabled);
    info!(
        skills = ?registry.skill_names(),
        providers = ?provider_names,
        connectors = ?connectors.names(),
        "components wired"
    );

    let dispatcher = Arc::new(Dispatcher::new(registry, ctx));

    Arc::new(AppState {
        dispatcher,
        connectors,
        metrics,
        history: Arc::new(ConversationStore::new()),
        rate_limiter: Arc::new(RateLimiter::new(config.channels.rate_limit_per_hour)),
        channels,
        ws_channel,
        provider_names,
        config,
    })
}
