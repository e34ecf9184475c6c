//! Per-user conversation history — a bounded in-memory ring with TTL
//! pruning. Channel adapters read it to inject `metadata.history`; the
//! dispatch core never touches it.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 20;
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// One remembered turn, as surfaced to skills via message metadata.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

struct Entry {
    role: String,
    content: String,
    inserted_at: Instant,
}

pub struct ConversationStore {
    entries: DashMap<String, VecDeque<Entry>>,
    capacity: usize,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
        }
    }

    /// Current history for `user`, oldest first. Prunes expired entries
    /// before returning.
    pub fn get(&self, user_id: &str) -> Vec<HistoryTurn> {
        let Some(mut ring) = self.entries.get_mut(user_id) else {
            return Vec::new();
        };
        let cutoff = Instant::now() - self.ttl;
        while ring.front().is_some_and(|e| e.inserted_at < cutoff) {
            ring.pop_front();
        }
        ring.iter()
            .map(|e| HistoryTurn {
                role: e.role.clone(),
                content: e.content.clone(),
            })
            .collect()
    }

    /// Append a turn, discarding from the front once over capacity.
    pub fn add(&self, user_id: &str, role: &str, content: &str) {
        let mut ring = self.entries.entry(user_id.to_string()).or_default();
        ring.push_back(Entry {
            role: role.to_string(),
            content: content.to_string(),
            inserted_at: Instant::now(),
        });
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    pub fn clear(&self, user_id: &str) {
        self.entries.remove(user_id);
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_round_trips() {
        let store = ConversationStore::new();
        store.add("u", "user", "hello");
        store.add("u", "assistant", "hi there");
        let history = store.get("u");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].content, "hi there");
    }

    #[test]
    fn capacity_discards_from_the_front() {
        let store = ConversationStore::with_limits(3, DEFAULT_TTL);
        for i in 0..5 {
            store.add("u", "user", &format!("msg {i}"));
        }
        let history = store.get("u");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "msg 2");
        assert_eq!(history[2].content, "msg 4");
    }

    #[test]
    fn ttl_prunes_on_get() {
        let store = ConversationStore::with_limits(20, Duration::from_millis(0));
        store.add("u", "user", "stale");
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.get("u").is_empty());
    }

    #[test]
    fn clear_empties_until_next_add() {
        let store = ConversationStore::new();
        store.add("u", "user", "hello");
        store.clear("u");
        assert!(store.get("u").is_empty());
        store.add("u", "user", "again");
        assert_eq!(store.get("u").len(), 1);
    }

    #[test]
    fn users_are_isolated() {
        let store = ConversationStore::new();
        store.add("a", "user", "from a");
        store.add("b", "user", "from b");
        assert_eq!(store.get("a").len(), 1);
        assert_eq!(store.get("a")[0].content, "from a");
    }
}
