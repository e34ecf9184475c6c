//! Per-user sliding-window rate limiter. Allocation is strictly per
//! process — nothing is shared or persisted.

use std::time::{Duration, Instant};

use dashmap::DashMap;

const WINDOW: Duration = Duration::from_secs(3600);

pub struct RateLimiter {
    windows: DashMap<String, Vec<Instant>>,
    max_per_hour: u32,
}

impl RateLimiter {
    pub fn new(max_per_hour: u32) -> Self {
        Self {
            windows: DashMap::new(),
            max_per_hour,
        }
    }

    /// Returns `(allowed, seconds_until_reset)`. Prunes the window, then
    /// accepts iff it holds fewer than the hourly maximum; on reject the
    /// reset time is when the oldest surviving timestamp ages out.
    pub fn check(&self, user_id: &str) -> (bool, u64) {
        let now = Instant::now();
        let mut window = self.windows.entry(user_id.to_string()).or_default();

        let cutoff = now - WINDOW;
        window.retain(|t| *t > cutoff);

        if window.len() >= self.max_per_hour as usize {
            let oldest = window.iter().min().copied().unwrap_or(now);
            let reset = (oldest + WINDOW).saturating_duration_since(now);
            return (false, reset.as_secs());
        }

        window.push(now);
        (true, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_until_the_limit() {
        let limiter = RateLimiter::new(2);
        assert_eq!(limiter.check("u"), (true, 0));
        assert_eq!(limiter.check("u"), (true, 0));
        let (allowed, reset) = limiter.check("u");
        assert!(!allowed);
        assert!(reset > 0 && reset <= 3600);
    }

    #[test]
    fn users_have_independent_windows() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("a").0);
        assert!(limiter.check("b").0);
        assert!(!limiter.check("a").0);
    }
}
