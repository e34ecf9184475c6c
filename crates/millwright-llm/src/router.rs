//! Intent-keyed LLM routing with budget enforcement and circuit-breaker
//! failover.
//!
//! Fallback order inside each route is authoritative — no randomization, no
//! weighting — so behavior under failure is reproducible.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use millwright_core::types::Intent;

use crate::budget::BudgetTracker;
use crate::health::HealthTracker;
use crate::provider::{ChatMessage, ImagePayload, LlmProvider, LlmResponse};

/// One routing-table entry: primary provider plus ordered fallbacks.
#[derive(Debug, Clone)]
pub struct Route {
    pub primary: String,
    pub fallbacks: Vec<String>,
}

impl Route {
    pub fn new(primary: &str, fallbacks: &[&str]) -> Self {
        Self {
            primary: primary.to_string(),
            fallbacks: fallbacks.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Compiled-in routing defaults. The table is data: config overrides
/// replace individual entries at startup.
pub fn default_routes() -> HashMap<Intent, Route> {
    HashMap::from([
        (Intent::Diagnose, Route::new("openrouter", &["groq", "deepseek", "nvidia"])),
        (Intent::Status, Route::new("groq", &["deepseek"])),
        (Intent::Photo, Route::new("openrouter", &["gemini", "anthropic"])),
        (Intent::WorkOrder, Route::new("openrouter", &["groq", "deepseek", "anthropic"])),
        (Intent::Chat, Route::new("groq", &["deepseek", "openrouter"])),
        (Intent::Search, Route::new("perplexity", &["groq"])),
        (Intent::Admin, Route::new("groq", &[])),
        (Intent::Help, Route::new("groq", &[])),
        (Intent::Diagram, Route::new("openrouter", &["groq", "deepseek", "anthropic"])),
        (Intent::Gist, Route::new("openrouter", &["groq", "deepseek", "anthropic"])),
        (Intent::Project, Route::new("openrouter", &["groq", "deepseek", "anthropic"])),
        (Intent::Unknown, Route::new("groq", &["deepseek", "openrouter"])),
        (Intent::KbEnrich, Route::new("openrouter", &["gemini", "anthropic"])),
        (Intent::WiringReconstruct, Route::new("openrouter", &["gemini", "anthropic"])),
    ])
}

/// A routed completion request.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub intent: Intent,
    pub messages: Vec<ChatMessage>,
    pub system_prompt: String,
    pub images: Vec<ImagePayload>,
    /// Attempt this provider first when it is usable; a failure there
    /// updates its health but does not consume a fallback slot.
    pub prefer: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub json_mode: bool,
}

impl RouteRequest {
    pub fn new(intent: Intent, messages: Vec<ChatMessage>) -> Self {
        Self {
            intent,
            messages,
            system_prompt: String::new(),
            images: Vec::new(),
            prefer: None,
            max_tokens: 1024,
            temperature: 0.3,
            json_mode: false,
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn images(mut self, images: Vec<ImagePayload>) -> Self {
        self.images = images;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    pub fn prefer(mut self, provider: impl Into<String>) -> Self {
        self.prefer = Some(provider.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(
        "no LLM provider available for intent `{intent}` (attempted: [{}]; skipped: [{}])",
        .attempted.join(", "),
        .skipped.iter().map(|(n, r)| format!("{n}: {r}")).collect::<Vec<_>>().join(", ")
    )]
    NoProviderAvailable {
        intent: Intent,
        attempted: Vec<String>,
        skipped: Vec<(String, String)>,
    },
}

/// Selects the right provider for an intent, enforcing budget and circuit
/// state, and fails over down the route's fallback chain.
pub struct LlmRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    budget: BudgetTracker,
    health: HealthTracker,
    routes: HashMap<Intent, Route>,
    default_route: Route,
}

impl LlmRouter {
    pub fn new(
        providers: HashMap<String, Arc<dyn LlmProvider>>,
        budget: BudgetTracker,
        routes: HashMap<Intent, Route>,
    ) -> Self {
        Self {
            providers,
            budget,
            health: HealthTracker::new(),
            routes,
            default_route: Route::new("groq", &["deepseek", "openrouter"]),
        }
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    /// `(name, is_available)` pairs, sorted by name.
    pub fn provider_names(&self) -> Vec<(String, bool)> {
        let mut out: Vec<(String, bool)> = self
            .providers
            .iter()
            .map(|(name, p)| (name.clone(), p.is_available()))
            .collect();
        out.sort();
        out
    }

    /// Select a provider and execute the request with automatic fallback.
    pub async fn route(&self, req: RouteRequest) -> Result<LlmResponse, RouterError> {
        // Explicitly preferred provider goes first, outside the fallback
        // chain. Its failure still counts against its health.
        if let Some(prefer) = req.prefer.clone() {
            if let Some(provider) = self.providers.get(&prefer) {
                if self.usable(provider.as_ref(), &req).is_ok() {
                    match self.call(provider.as_ref(), &req).await {
                        Ok(resp) => {
                            self.budget.record(&prefer, resp.tokens_used as u64);
                            self.health.record_success(&prefer);
                            return Ok(resp);
                        }
                        Err(e) => {
                            self.health.record_failure(&prefer);
                            warn!(provider = %prefer, err = %e, "preferred provider failed");
                        }
                    }
                }
            }
        }

        let route = self.routes.get(&req.intent).unwrap_or(&self.default_route);
        let mut candidates = Vec::with_capacity(1 + route.fallbacks.len());
        candidates.push(route.primary.clone());
        candidates.extend(route.fallbacks.iter().cloned());

        let mut attempted: Vec<String> = Vec::new();
        let mut skipped: Vec<(String, String)> = Vec::new();

        for name in candidates {
            let Some(provider) = self.providers.get(&name) else {
                skipped.push((name, "not configured".to_string()));
                continue;
            };
            if let Err(reason) = self.usable(provider.as_ref(), &req) {
                info!(provider = %name, reason, "skipping provider");
                skipped.push((name, reason.to_string()));
                continue;
            }

            attempted.push(name.clone());
            match self.call(provider.as_ref(), &req).await {
                Ok(resp) => {
                    self.budget.record(&name, resp.tokens_used as u64);
                    self.health.record_success(&name);
                    return Ok(resp);
                }
                Err(e) => {
                    warn!(provider = %name, err = %e, "provider failed, trying fallback");
                    self.health.record_failure(&name);
                }
            }
        }

        Err(RouterError::NoProviderAvailable {
            intent: req.intent,
            attempted,
            skipped,
        })
    }

    /// Gate a candidate before calling it. Returns the skip reason.
    fn usable(&self, provider: &dyn LlmProvider, req: &RouteRequest) -> Result<(), &'static str> {
        if !provider.is_available() {
            return Err("no credentials");
        }
        if !self.budget.is_within_budget(provider.name()) {
            warn!(provider = %provider.name(), "provider over budget");
            return Err("over budget");
        }
        if self.health.is_open(provider.name()) {
            let remaining = self
                .health
                .open_remaining(provider.name())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            info!(
                provider = %provider.name(),
                remaining_secs = remaining,
                "open circuit"
            );
            return Err("open circuit");
        }
        if !req.images.is_empty() && !provider.supports_vision() {
            return Err("no vision support");
        }
        if req.json_mode && !provider.supports_json_mode() {
            return Err("no json mode");
        }
        Ok(())
    }

    /// Execute one provider call, measuring latency across the call
    /// boundary only.
    async fn call(
        &self,
        provider: &dyn LlmProvider,
        req: &RouteRequest,
    ) -> Result<LlmResponse, crate::provider::ProviderError> {
        let start = Instant::now();
        let mut resp = if req.images.is_empty() {
            provider
                .complete(
                    &req.messages,
                    &req.system_prompt,
                    req.max_tokens,
                    req.temperature,
                    req.json_mode,
                )
                .await?
        } else {
            provider
                .complete_with_vision(
                    &req.messages,
                    &req.images,
                    &req.system_prompt,
                    req.max_tokens,
                )
                .await?
        };
        resp.latency_ms = start.elapsed().as_millis() as u64;
        info!(
            provider = %resp.provider,
            model = %resp.model,
            tokens = resp.tokens_used,
            latency_ms = resp.latency_ms,
            "llm response"
        );
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysOk {
        name: &'static str,
        calls: AtomicU32,
    }

    impl AlwaysOk {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            self.name
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _system_prompt: &str,
            _max_tokens: u32,
            _temperature: f32,
            _json_mode: bool,
        ) -> Result<LlmResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse {
                text: "ok".into(),
                model: "test-model".into(),
                provider: self.name.into(),
                tokens_used: 7,
                latency_ms: 0,
                raw: None,
            })
        }
    }

    struct AlwaysFail {
        name: &'static str,
        calls: AtomicU32,
    }

    impl AlwaysFail {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for AlwaysFail {
        fn name(&self) -> &str {
            self.name
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _system_prompt: &str,
            _max_tokens: u32,
            _temperature: f32,
            _json_mode: bool,
        ) -> Result<LlmResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Api {
                status: 500,
                message: "intentional failure".into(),
            })
        }
    }

    /// Accepts images but its text path fails with capability_missing.
    struct VisionOnly;

    #[async_trait]
    impl LlmProvider for VisionOnly {
        fn name(&self) -> &str {
            "vision-only"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn supports_vision(&self) -> bool {
            true
        }
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _system_prompt: &str,
            _max_tokens: u32,
            _temperature: f32,
            _json_mode: bool,
        ) -> Result<LlmResponse, ProviderError> {
            Err(ProviderError::CapabilityMissing(
                "vision-only accepts image requests only".into(),
            ))
        }
    }

    fn router_with(
        providers: Vec<(&str, Arc<dyn LlmProvider>)>,
        routes: HashMap<Intent, Route>,
    ) -> LlmRouter {
        let map = providers
            .into_iter()
            .map(|(n, p)| (n.to_string(), p))
            .collect();
        LlmRouter::new(map, BudgetTracker::new(), routes)
    }

    fn chat_request() -> RouteRequest {
        RouteRequest::new(Intent::Chat, vec![ChatMessage::user("hello")])
    }

    #[tokio::test]
    async fn falls_back_to_second_provider() {
        let routes = HashMap::from([(Intent::Chat, Route::new("bad", &["good"]))]);
        let router = router_with(
            vec![
                ("bad", Arc::new(AlwaysFail::new("bad"))),
                ("good", Arc::new(AlwaysOk::new("good"))),
            ],
            routes,
        );
        let resp = router.route(chat_request()).await.unwrap();
        assert_eq!(resp.provider, "good");
        assert_eq!(router.health().consecutive_failures("bad"), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempted_and_skipped() {
        let routes = HashMap::from([(Intent::Chat, Route::new("bad", &["missing"]))]);
        let router = router_with(vec![("bad", Arc::new(AlwaysFail::new("bad")))], routes);
        let err = router.route(chat_request()).await.unwrap_err();
        let RouterError::NoProviderAvailable {
            attempted, skipped, ..
        } = err;
        assert_eq!(attempted, vec!["bad"]);
        assert_eq!(skipped, vec![("missing".to_string(), "not configured".to_string())]);
    }

    #[tokio::test]
    async fn budget_is_recorded_once_per_successful_route() {
        let routes = HashMap::from([(Intent::Chat, Route::new("bad", &["good"]))]);
        let router = router_with(
            vec![
                ("bad", Arc::new(AlwaysFail::new("bad"))),
                ("good", Arc::new(AlwaysOk::new("good"))),
            ],
            routes,
        );
        router.budget().configure("bad", 10, 0);
        router.budget().configure("good", 10, 0);

        router.route(chat_request()).await.unwrap();

        let summary = router.budget().summary();
        assert_eq!(summary["bad"]["requests_today"], 0);
        assert_eq!(summary["good"]["requests_today"], 1);
        assert_eq!(summary["good"]["tokens_today"], 7);
    }

    #[tokio::test]
    async fn over_budget_provider_is_skipped_not_attempted() {
        let over = Arc::new(AlwaysOk::new("over"));
        let good = Arc::new(AlwaysOk::new("good"));
        let routes = HashMap::from([(Intent::Chat, Route::new("over", &["good"]))]);
        let router = router_with(
            vec![("over", over.clone()), ("good", good.clone())],
            routes,
        );
        router.budget().configure("over", 1, 0);
        router.budget().record("over", 0); // consume the only slot

        let resp = router.route(chat_request()).await.unwrap();
        assert_eq!(resp.provider, "good");
        assert_eq!(over.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn images_skip_non_vision_providers() {
        let text_only = Arc::new(AlwaysOk::new("text-only"));
        let routes = HashMap::from([(Intent::Photo, Route::new("text-only", &[]))]);
        let router = router_with(vec![("text-only", text_only.clone())], routes);

        let req = RouteRequest::new(Intent::Photo, vec![ChatMessage::user("what is this")])
            .images(vec![ImagePayload {
                data: vec![0xFF, 0xD8],
                mime_type: "image/jpeg".into(),
            }]);
        let err = router.route(req).await.unwrap_err();
        let RouterError::NoProviderAvailable { skipped, .. } = err;
        assert_eq!(skipped[0].1, "no vision support");
        assert_eq!(text_only.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn circuit_opens_after_three_failures_then_skips() {
        let bad = Arc::new(AlwaysFail::new("bad"));
        let good = Arc::new(AlwaysOk::new("good"));
        let routes = HashMap::from([(Intent::Chat, Route::new("bad", &["good"]))]);
        let router = router_with(vec![("bad", bad.clone()), ("good", good.clone())], routes);

        for _ in 0..3 {
            router.route(chat_request()).await.unwrap();
        }
        assert_eq!(bad.calls.load(Ordering::SeqCst), 3);
        assert!(router.health().is_open("bad"));

        // fourth request: bad is skipped, not called
        router.route(chat_request()).await.unwrap();
        assert_eq!(bad.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transport_capability_budget_chain_attempts_three_providers() {
        // primary fails (transport-ish), first fallback is over budget
        // (skipped), second is vision-only (attempted, capability failure),
        // third succeeds.
        let primary = Arc::new(AlwaysFail::new("primary"));
        let third = Arc::new(AlwaysOk::new("third"));
        let routes = HashMap::from([(
            Intent::Chat,
            Route::new("primary", &["over-budget", "vision-only", "third"]),
        )]);
        let router = router_with(
            vec![
                ("primary", primary.clone()),
                ("over-budget", Arc::new(AlwaysOk::new("over-budget"))),
                ("vision-only", Arc::new(VisionOnly)),
                ("third", third.clone()),
            ],
            routes,
        );
        router.budget().configure("over-budget", 1, 0);
        router.budget().record("over-budget", 0);
        router.budget().configure("third", 10, 0);

        let resp = router.route(chat_request()).await.unwrap();
        assert_eq!(resp.provider, "third");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(router.health().consecutive_failures("primary"), 1);
        let summary = router.budget().summary();
        assert_eq!(summary["third"]["requests_today"], 1);
    }

    #[tokio::test]
    async fn preferred_provider_is_tried_first() {
        let preferred = Arc::new(AlwaysOk::new("preferred"));
        let routes = HashMap::from([(Intent::Chat, Route::new("other", &[]))]);
        let router = router_with(
            vec![
                ("preferred", preferred.clone()),
                ("other", Arc::new(AlwaysOk::new("other"))),
            ],
            routes,
        );
        let resp = router
            .route(chat_request().prefer("preferred"))
            .await
            .unwrap();
        assert_eq!(resp.provider, "preferred");
    }

    #[tokio::test]
    async fn json_mode_skips_providers_without_it() {
        struct NoJson;
        #[async_trait]
        impl LlmProvider for NoJson {
            fn name(&self) -> &str {
                "no-json"
            }
            fn is_available(&self) -> bool {
                true
            }
            fn supports_json_mode(&self) -> bool {
                false
            }
            async fn complete(
                &self,
                _m: &[ChatMessage],
                _s: &str,
                _t: u32,
                _temp: f32,
                _j: bool,
            ) -> Result<LlmResponse, ProviderError> {
                panic!("should not be called");
            }
        }

        let good = Arc::new(AlwaysOk::new("good"));
        let routes = HashMap::from([(Intent::WorkOrder, Route::new("no-json", &["good"]))]);
        let router = router_with(
            vec![("no-json", Arc::new(NoJson)), ("good", good.clone())],
            routes,
        );
        let req = RouteRequest::new(Intent::WorkOrder, vec![ChatMessage::user("wo")])
            .json_mode(true);
        let resp = router.route(req).await.unwrap();
        assert_eq!(resp.provider, "good");
    }
}
