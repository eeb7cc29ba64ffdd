use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::Utc;

/// Bucket shared by every request that carries no forwarded address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Source of "now" in milliseconds, swappable in tests.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Sliding window limiter: at most `max_requests` admissions per client
/// within any `window`.
///
/// Windows live in this process only; separate server instances each keep
/// their own, so the effective limit scales with the instance count.
#[derive(Debug)]
pub struct RateLimiter {
    window_ms: i64,
    max_requests: usize,
    windows: Mutex<HashMap<String, Vec<i64>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject a request from `client_id` at `now` (ms).
    ///
    /// Rejected requests leave the client's window untouched.
    pub fn admit(&self, client_id: &str, now: i64) -> bool {
        // Filter, count and append under one lock so two concurrent requests
        // cannot both take the last slot.
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let timestamps = windows.entry(client_id.to_string()).or_default();

        timestamps.retain(|ts| now - ts < self.window_ms);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }

    pub fn check(&self, client_id: &str, clock: &dyn Clock) -> bool {
        self.admit(client_id, clock.now_ms())
    }

    /// Timestamps currently recorded for `client_id`, oldest first.
    pub fn recorded(&self, client_id: &str) -> Vec<i64> {
        let windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        windows.get(client_id).cloned().unwrap_or_default()
    }
}

/// Client identity from `x-forwarded-for`, falling back to [`UNKNOWN_CLIENT`].
pub fn client_id(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
