use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;
use uuid::Uuid;

/// How often stale windows are evicted from memory.
pub const EVICTION_INTERVAL_SECS: u64 = 5 * 60;

/// A named limit: at most `max_requests` per key per window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub name: &'static str,
    pub max_requests: u32,
    pub window_secs: i64,
}

/// 30 messages per user per minute.
pub const MESSAGE_POLICY: RateLimitPolicy = RateLimitPolicy {
    name: "message",
    max_requests: 30,
    window_secs: 60,
};

/// 10 conversation opens per user per hour.
pub const CONVERSATION_POLICY: RateLimitPolicy = RateLimitPolicy {
    name: "conversation",
    max_requests: 10,
    window_secs: 3600,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_time: DateTime<Utc>,
}

/// Fixed-window request counter keyed by `"<policy>:<key>"`.
///
/// State is process-local: with several server instances each enforces its
/// own limits.
#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `key` at `now` and report whether it is allowed.
    ///
    /// The first request for a key, or the first one at or after the
    /// window's reset time, opens a fresh window. Requests beyond the limit
    /// are still counted, so hammering a closed window does not reopen it.
    pub fn check(&self, key: &str, max_requests: u32, window: TimeDelta, now: DateTime<Utc>) -> RateLimitDecision {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(entry) = windows.get_mut(key) {
            if now < entry.reset_time {
                entry.count = entry.count.saturating_add(1);
                return RateLimitDecision {
                    allowed: entry.count <= max_requests,
                    remaining: max_requests.saturating_sub(entry.count),
                    reset_time: entry.reset_time,
                };
            }
        }

        let reset_time = now + window;
        windows.insert(key.to_string(), Window { count: 1, reset_time });
        RateLimitDecision {
            allowed: max_requests >= 1,
            remaining: max_requests.saturating_sub(1),
            reset_time,
        }
    }

    /// Apply a named policy to a user.
    pub fn check_user(&self, policy: &RateLimitPolicy, user_id: Uuid, now: DateTime<Utc>) -> RateLimitDecision {
        let key = format!("{}:{}", policy.name, user_id);
        self.check(&key, policy.max_requests, TimeDelta::seconds(policy.window_secs), now)
    }

    /// Drop every window that has already reset. Returns how many were dropped.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, w| w.reset_time > now);
        before - windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background task bounding the limiter's memory.
pub async fn run_eviction_loop(limiter: Arc<RateLimiter>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let evicted = limiter.evict_expired(Utc::now());
        if evicted > 0 {
            debug!("Rate limiter: evicted {} expired windows ({} live)", evicted, limiter.len());
        }
    }
}
