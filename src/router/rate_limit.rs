//! Sliding-window rate limiter for the router's admission gate.
//!
//! Tracks request timestamps per caller key over a fixed window. This
//! is the router's only admission concern; transport-level enforcement
//! (HTTP 429) sits outside the core.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-caller sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `limit` requests per `window` for
    /// each caller key.
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Records a request for `key` if the window has room.
    ///
    /// Returns `true` when the request is admitted.
    pub fn check(&self, key: &str) -> bool {
        let Ok(mut requests) = self.requests.lock() else {
            // A poisoned gate fails open: dropping requests on an
            // internal fault would be worse than briefly not limiting
            return true;
        };

        let now = Instant::now();
        let log = requests.entry(key.to_string()).or_default();

        Self::expire(log, now, self.window);

        if log.len() >= self.limit {
            return false;
        }

        log.push_back(now);
        true
    }

    /// Requests remaining in the current window for `key`.
    pub fn remaining(&self, key: &str) -> usize {
        let Ok(mut requests) = self.requests.lock() else {
            return self.limit;
        };

        let now = Instant::now();
        let log = requests.entry(key.to_string()).or_default();
        Self::expire(log, now, self.window);

        self.limit.saturating_sub(log.len())
    }

    fn expire(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while log
            .front()
            .is_some_and(|t| now.duration_since(*t) >= window)
        {
            log.pop_front();
        }
    }
}
