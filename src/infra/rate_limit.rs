use {
    crate::domain::ports::{RateLimitDecision, RateLimiter},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    parking_lot::Mutex,
    std::{collections::HashMap, time::Duration},
};

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Fixed-window counter per key, held in process memory. Counts reset on
/// restart and are not shared between replicas.
#[derive(Debug, Default)]
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_at(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let span = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(1));
        let mut windows = self.windows.lock();

        // Drop expired windows so the map does not grow without bound.
        windows.retain(|_, w| now < w.started_at + span);

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        let reset_at = entry.started_at + span;

        if entry.count >= limit {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                limit,
                reset_at,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: limit - entry.count,
            limit,
            reset_at,
        }
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn check(&self, key: &str, limit: u32, window: Duration) -> RateLimitDecision {
        self.check_at(key, limit, window, Utc::now())
    }
}
