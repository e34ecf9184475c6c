//! Provider circuit breaker — consecutive-failure counting with a cooldown
//! window. Per provider, not per model.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

/// Failures before the circuit opens.
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 3;
/// How long an open circuit keeps the provider out of rotation.
pub const CIRCUIT_BREAKER_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct HealthEntry {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    circuit_open_until: Option<Instant>,
}

impl HealthEntry {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            last_failure: None,
            circuit_open_until: None,
        }
    }
}

/// Public snapshot for admin output.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub name: String,
    pub consecutive_failures: u32,
    /// Seconds until the circuit closes again; 0 when closed.
    pub circuit_open_secs: u64,
}

pub struct HealthTracker {
    entries: DashMap<String, HealthEntry>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Any success resets the failure counter and closes the circuit
    /// immediately.
    pub fn record_success(&self, provider: &str) {
        if let Some(mut entry) = self.entries.get_mut(provider) {
            entry.consecutive_failures = 0;
            entry.circuit_open_until = None;
        }
    }

    pub fn record_failure(&self, provider: &str) {
        self.record_failure_at(provider, Instant::now());
    }

    pub fn is_open(&self, provider: &str) -> bool {
        self.is_open_at(provider, Instant::now())
    }

    /// Remaining cooldown, `None` when the circuit is closed.
    pub fn open_remaining(&self, provider: &str) -> Option<Duration> {
        let now = Instant::now();
        let entry = self.entries.get(provider)?;
        let until = entry.circuit_open_until?;
        if now < until {
            Some(until - now)
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> Vec<HealthSnapshot> {
        let now = Instant::now();
        let mut out: Vec<HealthSnapshot> = self
            .entries
            .iter()
            .map(|e| {
                let open_secs = e
                    .circuit_open_until
                    .filter(|until| now < *until)
                    .map(|until| (until - now).as_secs())
                    .unwrap_or(0);
                HealthSnapshot {
                    name: e.key().clone(),
                    consecutive_failures: e.consecutive_failures,
                    circuit_open_secs: open_secs,
                }
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub(crate) fn record_failure_at(&self, provider: &str, now: Instant) {
        let mut entry = self
            .entries
            .entry(provider.to_string())
            .or_insert_with(HealthEntry::new);

        entry.consecutive_failures += 1;
        entry.last_failure = Some(now);

        if entry.consecutive_failures >= CIRCUIT_BREAKER_THRESHOLD {
            entry.circuit_open_until = Some(now + CIRCUIT_BREAKER_COOLDOWN);
            tracing::warn!(
                provider,
                failures = entry.consecutive_failures,
                cooldown_secs = CIRCUIT_BREAKER_COOLDOWN.as_secs(),
                "circuit breaker OPEN"
            );
        }
    }

    pub(crate) fn is_open_at(&self, provider: &str, now: Instant) -> bool {
        self.entries
            .get(provider)
            .and_then(|e| e.circuit_open_until)
            .is_some_and(|until| now < until)
    }

    pub(crate) fn consecutive_failures(&self, provider: &str) -> u32 {
        self.entries
            .get(provider)
            .map(|e| e.consecutive_failures)
            .unwrap_or(0)
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_opens_after_threshold() {
        let tracker = HealthTracker::new();
        let now = Instant::now();
        tracker.record_failure_at("p", now);
        tracker.record_failure_at("p", now);
        assert!(!tracker.is_open_at("p", now));
        tracker.record_failure_at("p", now);
        assert!(tracker.is_open_at("p", now));
    }

    #[test]
    fn circuit_closes_after_cooldown() {
        let tracker = HealthTracker::new();
        let now = Instant::now();
        for _ in 0..3 {
            tracker.record_failure_at("p", now);
        }
        // still open one second before the cooldown ends
        assert!(tracker.is_open_at("p", now + Duration::from_secs(299)));
        // admitted again from cooldown onward
        assert!(!tracker.is_open_at("p", now + Duration::from_secs(301)));
    }

    #[test]
    fn success_resets_counter_and_closes_circuit() {
        let tracker = HealthTracker::new();
        let now = Instant::now();
        for _ in 0..3 {
            tracker.record_failure_at("p", now);
        }
        assert!(tracker.is_open_at("p", now));
        tracker.record_success("p");
        assert!(!tracker.is_open_at("p", now));
        assert_eq!(tracker.consecutive_failures("p"), 0);
    }

    #[test]
    fn snapshot_reports_open_circuits() {
        let tracker = HealthTracker::new();
        tracker.record_failure("a");
        for _ in 0..3 {
            tracker.record_failure("b");
        }
        let snap = tracker.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].name, "a");
        assert_eq!(snap[0].circuit_open_secs, 0);
        assert!(snap[1].circuit_open_secs > 0);
    }
}
