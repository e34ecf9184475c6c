//! Daily request/token budgets per provider. Counters are process-local,
//! in-memory, never persisted; the midnight (local calendar date) reset is
//! lazy — applied at the start of any read or write for that provider.

use chrono::NaiveDate;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::warn;

#[derive(Debug, Clone)]
struct ProviderBudget {
    /// 0 = unlimited.
    daily_request_limit: u64,
    daily_token_limit: u64,
    requests_today: u64,
    tokens_today: u64,
    last_reset: NaiveDate,
}

impl ProviderBudget {
    fn maybe_reset(&mut self, today: NaiveDate) {
        if today > self.last_reset {
            self.requests_today = 0;
            self.tokens_today = 0;
            self.last_reset = today;
        }
    }

    fn is_within_budget(&mut self, today: NaiveDate) -> bool {
        self.maybe_reset(today);
        if self.daily_request_limit > 0 && self.requests_today >= self.daily_request_limit {
            return false;
        }
        if self.daily_token_limit > 0 && self.tokens_today >= self.daily_token_limit {
            return false;
        }
        true
    }

    fn record(&mut self, tokens: u64, today: NaiveDate) {
        self.maybe_reset(today);
        self.requests_today += 1;
        self.tokens_today += tokens;
    }
}

/// Tracks budgets across all providers. Providers without a configured
/// budget are always within budget.
pub struct BudgetTracker {
    budgets: DashMap<String, ProviderBudget>,
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self {
            budgets: DashMap::new(),
        }
    }

    pub fn configure(&self, provider: &str, daily_request_limit: u64, daily_token_limit: u64) {
        self.budgets.insert(
            provider.to_string(),
            ProviderBudget {
                daily_request_limit,
                daily_token_limit,
                requests_today: 0,
                tokens_today: 0,
                last_reset: today(),
            },
        );
    }

    pub fn is_within_budget(&self, provider: &str) -> bool {
        match self.budgets.get_mut(provider) {
            Some(mut budget) => budget.is_within_budget(today()),
            None => true,
        }
    }

    /// Record one successful request. Called only after the provider
    /// returned — a failed attempt never consumes budget.
    pub fn record(&self, provider: &str, tokens: u64) {
        if let Some(mut budget) = self.budgets.get_mut(provider) {
            budget.record(tokens, today());
            if budget.daily_request_limit > 0 {
                let pct = budget.requests_today * 100 / budget.daily_request_limit;
                if pct >= 90 {
                    warn!(
                        provider,
                        used = budget.requests_today,
                        limit = budget.daily_request_limit,
                        "budget warning: {}% of daily request limit used",
                        pct
                    );
                }
            }
        }
    }

    pub fn summary(&self) -> Value {
        let mut out = serde_json::Map::new();
        for mut entry in self.budgets.iter_mut() {
            let today = today();
            let within = entry.is_within_budget(today);
            let budget = entry.value();
            out.insert(
                entry.key().clone(),
                json!({
                    "requests_today": budget.requests_today,
                    "tokens_today": budget.tokens_today,
                    "daily_request_limit": budget.daily_request_limit,
                    "within_budget": within,
                }),
            );
        }
        Value::Object(out)
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_provider_is_always_within_budget() {
        let tracker = BudgetTracker::new();
        assert!(tracker.is_within_budget("groq"));
    }

    #[test]
    fn request_limit_blocks_when_reached() {
        let tracker = BudgetTracker::new();
        tracker.configure("groq", 2, 0);
        assert!(tracker.is_within_budget("groq"));
        tracker.record("groq", 10);
        assert!(tracker.is_within_budget("groq"));
        tracker.record("groq", 10);
        assert!(!tracker.is_within_budget("groq"));
    }

    #[test]
    fn token_limit_blocks_when_reached() {
        let tracker = BudgetTracker::new();
        tracker.configure("openrouter", 0, 100);
        tracker.record("openrouter", 120);
        assert!(!tracker.is_within_budget("openrouter"));
    }

    #[test]
    fn zero_limits_mean_unlimited() {
        let tracker = BudgetTracker::new();
        tracker.configure("groq", 0, 0);
        for _ in 0..1000 {
            tracker.record("groq", 1000);
        }
        assert!(tracker.is_within_budget("groq"));
    }

    #[test]
    fn summary_observes_increments() {
        let tracker = BudgetTracker::new();
        tracker.configure("groq", 10, 0);
        tracker.record("groq", 42);
        let summary = tracker.summary();
        assert_eq!(summary["groq"]["requests_today"], 1);
        assert_eq!(summary["groq"]["tokens_today"], 42);
        assert_eq!(summary["groq"]["within_budget"], true);
    }

    #[test]
    fn date_rollover_resets_counters_on_first_read() {
        let tracker = BudgetTracker::new();
        tracker.configure("groq", 2, 0);
        tracker.record("groq", 10);
        tracker.record("groq", 10);
        assert!(!tracker.is_within_budget("groq"));

        // simulate yesterday's reset marker
        tracker
            .budgets
            .get_mut("groq")
            .unwrap()
            .last_reset = today().pred_opt().unwrap();

        assert!(tracker.is_within_budget("groq"));
        let summary = tracker.summary();
        assert_eq!(summary["groq"]["requests_today"], 0);
        assert_eq!(summary["groq"]["tokens_today"], 0);
    }
}
