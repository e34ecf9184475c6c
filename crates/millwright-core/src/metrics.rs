//! In-process metrics — no external deps, reset on restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::{json, Value};

/// Counts requests by intent and provider, plus a rolling latency sample.
pub struct MetricsCollector {
    started_at: Instant,
    total_requests: AtomicU64,
    intent_counts: DashMap<String, u64>,
    provider_counts: DashMap<String, u64>,
    latencies: Mutex<Vec<u64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            intent_counts: DashMap::new(),
            provider_counts: DashMap::new(),
            latencies: Mutex::new(Vec::new()),
        }
    }

    /// Record one completed dispatch. `provider` may be empty (Layer-0 and
    /// non-LLM skills); `latency_ms` of 0 is not sampled.
    pub fn record_request(&self, intent: &str, provider: &str, latency_ms: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        *self.intent_counts.entry(intent.to_string()).or_insert(0) += 1;
        if !provider.is_empty() {
            *self.provider_counts.entry(provider.to_string()).or_insert(0) += 1;
        }
        if latency_ms > 0 {
            let mut lat = self.latencies.lock().unwrap();
            lat.push(latency_ms);
            // keep the sample bounded
            if lat.len() > 1000 {
                let excess = lat.len() - 500;
                lat.drain(..excess);
            }
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> Value {
        let lat = self.latencies.lock().unwrap();
        let avg_latency = if lat.is_empty() {
            0
        } else {
            lat.iter().sum::<u64>() / lat.len() as u64
        };

        let intents: serde_json::Map<String, Value> = self
            .intent_counts
            .iter()
            .map(|e| (e.key().clone(), json!(*e.value())))
            .collect();
        let providers: serde_json::Map<String, Value> = self
            .provider_counts
            .iter()
            .map(|e| (e.key().clone(), json!(*e.value())))
            .collect();

        json!({
            "uptime_seconds": self.started_at.elapsed().as_secs(),
            "total_requests": self.total_requests.load(Ordering::Relaxed),
            "intents": intents,
            "providers": providers,
            "avg_latency_ms": avg_latency,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
