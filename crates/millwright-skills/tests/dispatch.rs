//! End-to-end dispatch scenarios with mock providers and connectors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use millwright_connectors::connector::{ConnectorError, ServiceConnector};
use millwright_connectors::gist::{GistFile, GistHandle, GistPublisher};
use millwright_connectors::knowledge::{AtomUpdate, KbAtom, KnowledgeStore, Provenance};
use millwright_connectors::telemetry::{TagMap, TelemetrySource};
use millwright_connectors::Connectors;
use millwright_core::config::MillwrightConfig;
use millwright_core::metrics::MetricsCollector;
use millwright_core::types::{Attachment, ChannelKind, InboundMessage, OutboundMessage};
use millwright_enrich::EnrichmentPipeline;
use millwright_llm::budget::BudgetTracker;
use millwright_llm::provider::{ChatMessage, ImagePayload, LlmProvider, LlmResponse, ProviderError};
use millwright_llm::router::{LlmRouter, Route};
use millwright_skills::{Dispatcher, NotificationSink, SkillContext, SkillRegistry};

// ── Mocks ────────────────────────────────────────────────────────────────────

/// Provider that replies with a fixed string and counts calls.
struct ScriptedProvider {
    name: &'static str,
    reply: String,
    vision: bool,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn new(name: &'static str, reply: &str) -> Self {
        Self {
            name,
            reply: reply.to_string(),
            vision: false,
            calls: AtomicU32::new(0),
        }
    }

    fn with_vision(mut self) -> Self {
        self.vision = true;
        self
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }
    fn is_available(&self) -> bool {
        true
    }
    fn supports_vision(&self) -> bool {
        self.vision
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
            text: self.reply.clone(),
            model: "mock-model".into(),
            provider: self.name.into(),
            tokens_used: 5,
            latency_ms: 0,
            raw: None,
        })
    }
    async fn complete_with_vision(
        &self,
        messages: &[ChatMessage],
        _images: &[ImagePayload],
        system_prompt: &str,
        max_tokens: u32,
    ) -> Result<LlmResponse, ProviderError> {
        self.complete(messages, system_prompt, max_tokens, 0.0, false)
            .await
    }
}

struct StubTelemetry {
    tags: TagMap,
}

#[async_trait]
impl ServiceConnector for StubTelemetry {
    fn name(&self) -> &'static str {
        "telemetry"
    }
    async fn health_check(&self) -> Value {
        json!({"status": "healthy"})
    }
}

#[async_trait]
impl TelemetrySource for StubTelemetry {
    async fn get_latest_tags(
        &self,
        _node_id: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<TagMap>, ConnectorError> {
        Ok(vec![self.tags.clone()])
    }
}

#[derive(Default)]
struct StubKb {
    by_fault_code: HashMap<String, Vec<KbAtom>>,
    by_search: Vec<KbAtom>,
    inserted: Mutex<Vec<KbAtom>>,
}

#[async_trait]
impl ServiceConnector for StubKb {
    fn name(&self) -> &'static str {
        "knowledge"
    }
    async fn health_check(&self) -> Value {
        json!({"status": "healthy"})
    }
}

#[async_trait]
impl KnowledgeStore for StubKb {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<KbAtom>, ConnectorError> {
        Ok(self.by_search.clone())
    }
    async fn search_by_fault_code(
        &self,
        code: &str,
        _limit: usize,
    ) -> Result<Vec<KbAtom>, ConnectorError> {
        Ok(self.by_fault_code.get(code).cloned().unwrap_or_default())
    }
    async fn search_by_symptoms(
        &self,
        _symptom: &str,
        _limit: usize,
    ) -> Result<Vec<KbAtom>, ConnectorError> {
        Ok(Vec::new())
    }
    async fn get_by_type(
        &self,
        _atom_type: &str,
        _limit: usize,
    ) -> Result<Vec<KbAtom>, ConnectorError> {
        Ok(Vec::new())
    }
    async fn find_by_part(
        &self,
        _vendor: &str,
        _part_number: &str,
    ) -> Result<Option<KbAtom>, ConnectorError> {
        Ok(None)
    }
    async fn insert_atom(&self, atom: &KbAtom) -> Result<Option<i64>, ConnectorError> {
        self.inserted.lock().unwrap().push(atom.clone());
        Ok(Some(101))
    }
    async fn update_atom(
        &self,
        _atom_id: i64,
        _fields: &AtomUpdate,
        _provenance: Option<&Provenance>,
        _conflict: bool,
    ) -> Result<bool, ConnectorError> {
        Ok(true)
    }
}

#[derive(Default)]
struct StubGist {
    created: Mutex<Vec<(String, Vec<GistFile>)>>,
}

#[async_trait]
impl ServiceConnector for StubGist {
    fn name(&self) -> &'static str {
        "gist"
    }
    async fn health_check(&self) -> Value {
        json!({"status": "healthy"})
    }
}

#[async_trait]
impl GistPublisher for StubGist {
    async fn create(
        &self,
        description: &str,
        files: &[GistFile],
        _public: bool,
    ) -> Result<GistHandle, ConnectorError> {
        self.created
            .lock()
            .unwrap()
            .push((description.to_string(), files.to_vec()));
        Ok(GistHandle {
            id: "abc123".into(),
            url: "https://gist.example/abc123".into(),
        })
    }
}

#[derive(Default)]
struct CapturingNotifier {
    notices: Mutex<Vec<OutboundMessage>>,
}

#[async_trait]
impl NotificationSink for CapturingNotifier {
    async fn notify(&self, message: OutboundMessage) {
        self.notices.lock().unwrap().push(message);
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    dispatcher: Dispatcher,
    provider: Arc<ScriptedProvider>,
    gist: Arc<StubGist>,
    kb: Arc<StubKb>,
    notifier: Arc<CapturingNotifier>,
    metrics: Arc<MetricsCollector>,
}

fn build_harness(provider: ScriptedProvider, telemetry_tags: Option<Value>, kb: StubKb) -> Harness {
    let provider = Arc::new(provider);
    let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
    providers.insert(provider.name().to_string(), provider.clone());

    let mut routes = millwright_llm::router::default_routes();
    for route in routes.values_mut() {
        *route = Route::new(provider.name(), &[]);
    }
    let router = Arc::new(LlmRouter::new(providers, BudgetTracker::new(), routes));

    let kb = Arc::new(kb);
    let gist = Arc::new(StubGist::default());
    let notifier = Arc::new(CapturingNotifier::default());
    let metrics = Arc::new(MetricsCollector::new());

    let connectors = Connectors {
        knowledge: Some(kb.clone()),
        telemetry: telemetry_tags.map(|tags| {
            Arc::new(StubTelemetry {
                tags: tags.as_object().unwrap().clone(),
            }) as Arc<dyn TelemetrySource>
        }),
        gist: Some(gist.clone()),
        ..Default::default()
    };

    let enrichment = Arc::new(EnrichmentPipeline::new(
        router.clone(),
        Some(kb.clone() as Arc<dyn KnowledgeStore>),
    ));

    let ctx = SkillContext {
        llm: router,
        connectors,
        config: Arc::new(MillwrightConfig::default()),
        metrics: metrics.clone(),
        notifier: Some(notifier.clone()),
        enrichment: Some(enrichment),
    };

    let mut registry = SkillRegistry::new();
    registry.register_builtins(&[]);

    Harness {
        dispatcher: Dispatcher::new(registry, ctx),
        provider,
        gist,
        kb,
        notifier,
        metrics,
    }
}

fn estop_procedure_atom() -> KbAtom {
    KbAtom {
        atom_id: Some(17),
        atom_type: "procedure".into(),
        title: "E-Stop Reset Procedure".into(),
        summary: "Safe reset sequence after an emergency stop.".into(),
        steps: vec![
            "Verify the area is safe".into(),
            "Twist-release the E-stop head".into(),
            "Press the fault reset button".into(),
        ],
        score: Some(0.93),
        ..Default::default()
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

/// Diagnose happy path: E001 emergency, actionable procedure atom, Layer-0
/// answers without any LLM call.
#[tokio::test]
async fn diagnose_layer0_short_circuits_the_llm() {
    let mut kb = StubKb::default();
    kb.by_fault_code
        .insert("E001".to_string(), vec![estop_procedure_atom()]);

    let harness = build_harness(
        ScriptedProvider::new("groq", "llm answer"),
        Some(json!({
            "motor_running": false, "conveyor_running": false,
            "e_stop": true, "motor_current": 0,
        })),
        kb,
    );

    let msg = InboundMessage::new(ChannelKind::Telegram, "42", "Why is the conveyor stopped?");
    let reply = harness.dispatcher.dispatch(msg).await;

    assert_eq!(reply.channel, ChannelKind::Telegram);
    assert_eq!(reply.user_id, "42");
    assert!(reply.text.contains("E001"));
    assert!(reply.text.contains("Emergency Stop Active"));
    assert!(reply.text.contains("- Verify the area is safe"));
    assert!(reply.text.contains("**Sources:**"));
    assert!(reply.text.contains("1. E-Stop Reset Procedure"));
    assert!(reply.text.ends_with("_Layer 0 (KB direct) | 0ms_"));
    // no LLM provider was called
    assert_eq!(harness.provider.calls.load(Ordering::SeqCst), 0);
}

/// Without an actionable atom the diagnose path goes to the LLM and appends
/// the deterministic sources block plus the model footer.
#[tokio::test]
async fn diagnose_without_layer0_calls_llm_and_cites_sources() {
    let mut kb = StubKb::default();
    kb.by_fault_code.insert(
        "E001".to_string(),
        vec![KbAtom {
            atom_id: Some(3),
            atom_type: "concept".into(),
            title: "Emergency Stop Circuits".into(),
            summary: "Background on category-0 stops.".into(),
            ..Default::default()
        }],
    );

    let harness = build_harness(
        ScriptedProvider::new("groq", "Check the E-stop head first."),
        Some(json!({"e_stop": true, "motor_running": false, "conveyor_running": false})),
        kb,
    );

    let msg = InboundMessage::new(ChannelKind::HttpApi, "7", "Why is the conveyor stopped?");
    let reply = harness.dispatcher.dispatch(msg).await;

    assert!(reply.text.starts_with("Check the E-stop head first."));
    assert!(reply.text.contains("**Sources:**\n1. Emergency Stop Circuits"));
    assert!(reply.text.contains("_Model: mock-model |"));
    assert_eq!(harness.provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(reply.metadata["provider"], "groq");
}

/// Intent classifier regression set, end to end through the dispatcher.
#[tokio::test]
async fn classifier_regression_set_via_dispatch_metadata() {
    let harness = build_harness(
        ScriptedProvider::new("groq", "ok").with_vision(),
        Some(json!({"motor_running": true, "conveyor_running": true, "pressure": 80,
                    "motor_speed": 60, "conveyor_speed": 55, "temperature": 40.0,
                    "motor_current": 2.0})),
        StubKb::default(),
    );

    let cases: Vec<(InboundMessage, &str)> = vec![
        (
            InboundMessage::new(ChannelKind::HttpApi, "u", "Why is the conveyor stopped?"),
            "diagnose",
        ),
        (
            InboundMessage::new(ChannelKind::HttpApi, "u", "Show me current status"),
            "status",
        ),
        (
            InboundMessage::new(ChannelKind::HttpApi, "u", "Create a work order for motor repair"),
            "work_order",
        ),
        (InboundMessage::new(ChannelKind::HttpApi, "u", "/health"), "admin"),
        (
            InboundMessage::new(ChannelKind::HttpApi, "u", "hello how are you"),
            "chat",
        ),
        (
            {
                let mut m = InboundMessage::new(ChannelKind::HttpApi, "u", "");
                m.attachments
                    .push(Attachment::image(vec![0xFF, 0xD8, 0xFF], "image/jpeg"));
                m
            },
            "photo",
        ),
    ];

    for (msg, expected_intent) in cases {
        let user = msg.user_id.clone();
        let channel = msg.channel;
        let reply = harness.dispatcher.dispatch(msg).await;
        assert_eq!(reply.metadata["intent"], expected_intent);
        assert_eq!(reply.user_id, user);
        assert_eq!(reply.channel, channel);
    }
}

/// Photo + enrichment: the reply returns promptly and the enrichment side
/// task delivers a separate notification to the same user and channel.
#[tokio::test]
async fn photo_reply_spawns_enrichment_notification() {
    let enrichment_json = json!({
        "vendor": "Allen-Bradley",
        "product": "100-C",
        "part_number": "100-C09D10",
        "component_type": "contactor",
        "ratings": {"voltage": "600V"},
        "terminals": {"A1": {"label": "Coil+"}},
        "wiring_diagram": {"coil_terminals": ["A1", "A2"]},
        "confidence": 0.9,
    })
    .to_string();

    let harness = build_harness(
        ScriptedProvider::new("openrouter", &enrichment_json).with_vision(),
        None,
        StubKb::default(),
    );

    let mut msg = InboundMessage::new(ChannelKind::Telegram, "42", "");
    msg.attachments
        .push(Attachment::image(vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg"));
    let reply = harness.dispatcher.dispatch(msg).await;

    assert_eq!(reply.metadata["intent"], "photo");
    assert!(reply.text.contains("_Model: mock-model |"));

    // the side task completes after the reply; poll briefly for it
    let mut notice = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let notices = harness.notifier.notices.lock().unwrap();
        if let Some(n) = notices.first() {
            notice = Some(n.clone());
            break;
        }
    }
    let notice = notice.expect("enrichment notification never arrived");
    assert_eq!(notice.channel, ChannelKind::Telegram);
    assert_eq!(notice.user_id, "42");
    assert!(notice.text.contains("KB Enrichment"));
    assert!(notice.text.contains("Allen-Bradley"));

    // the pipeline wrote a new atom through the KB connector
    let inserted = harness.kb.inserted.lock().unwrap();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].part_number, "100-C09D10");
}

/// Portable work-order fallback: no CMMS configured, so the skill renders
/// Markdown + CSV + manifest and publishes through the gist connector.
#[tokio::test]
async fn work_order_falls_back_to_portable_gist() {
    let extraction = json!({
        "title": "Bearing replacement on M1",
        "description": "Replace the front bearing on motor M1.",
        "priority": "HIGH",
        "asset_name": "M1",
        "asset_id": null,
        "location": "Line 1",
        "work_type": "corrective",
        "category": "mechanical",
        "failure_code": "BRG",
    })
    .to_string();

    let harness = build_harness(
        ScriptedProvider::new("groq", &extraction),
        None,
        StubKb::default(),
    );

    let msg = InboundMessage::new(
        ChannelKind::Telegram,
        "42",
        "Make a WO for bearing replacement on M1, high priority",
    );
    let reply = harness.dispatcher.dispatch(msg).await;

    assert_eq!(reply.metadata["intent"], "work_order");
    assert!(reply.text.contains("https://gist.example/abc123"));
    let wo_re = regex::Regex::new(r"WO-\d{4}-\d{4}-\d{3}").unwrap();
    assert!(wo_re.is_match(&reply.text), "no WO id in: {}", reply.text);
    assert!(reply.text.contains("Bearing replacement on M1"));
    assert!(reply.text.contains("Priority: HIGH"));

    let created = harness.gist.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    let names: Vec<&str> = created[0].1.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["work-order.md", "work-order.csv", "attachments.txt"]);
    let md = &created[0].1[0].content;
    assert!(md.contains("**Priority:** HIGH"));
    assert!(md.contains("**Asset:** M1"));
    let csv = &created[0].1[1].content;
    assert_eq!(csv.lines().count(), 2);
}

/// Chat Layer-0: an actionable top-ranked atom answers without the LLM.
#[tokio::test]
async fn chat_layer0_answers_from_actionable_atom() {
    let mut kb = StubKb::default();
    kb.by_search = vec![KbAtom {
        atom_id: Some(5),
        atom_type: "troubleshooting".into(),
        title: "VFD Overvoltage Trips".into(),
        summary: "Deceleration too fast for the bus capacitance.".into(),
        fixes: vec!["Increase the deceleration ramp time".into()],
        score: Some(0.91),
        ..Default::default()
    }];

    let harness = build_harness(ScriptedProvider::new("groq", "llm"), None, kb);

    let msg = InboundMessage::new(ChannelKind::Websocket, "9", "hello what about vfd trips");
    let reply = harness.dispatcher.dispatch(msg).await;

    assert!(reply.text.contains("VFD Overvoltage Trips"));
    assert!(reply.text.contains("- Increase the deceleration ramp time"));
    assert!(reply.text.ends_with("_Layer 0 (KB direct) | 0ms_"));
    assert_eq!(harness.provider.calls.load(Ordering::SeqCst), 0);
}

/// The dispatcher's metrics record the intent and, for LLM-backed replies,
/// the provider.
#[tokio::test]
async fn dispatch_records_metrics() {
    let harness = build_harness(ScriptedProvider::new("groq", "hi"), None, StubKb::default());

    let msg = InboundMessage::new(ChannelKind::HttpApi, "u", "hello there friend");
    harness.dispatcher.dispatch(msg).await;

    let summary = harness.metrics.summary();
    assert_eq!(summary["total_requests"], 1);
    assert_eq!(summary["intents"]["chat"], 1);
    assert_eq!(summary["providers"]["groq"], 1);
}

/// Shell is gated on a non-empty operator list.
#[tokio::test]
async fn shell_requires_listed_operator() {
    let harness = build_harness(ScriptedProvider::new("groq", "x"), None, StubKb::default());
    let msg = InboundMessage::new(ChannelKind::Telegram, "42", "/run uptime");
    let reply = harness.dispatcher.dispatch(msg).await;
    assert!(reply.text.contains("restricted"));
}
