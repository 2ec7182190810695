//! Sliding-window rate limiting.
//!
//! A process-wide token map: one timestamp queue per key, pruned on every
//! check. Used with source addresses for the webhook endpoint (requests that
//! verify against the shared secret are exempted by the caller) and with
//! workspace ids for the alignment-analyzer quota.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A fixed-capacity sliding window per key.
#[derive(Debug)]
pub struct SlidingWindow {
    window: Duration,
    max: usize,
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl SlidingWindow {
    /// A limiter allowing `max` hits per `window` per key.
    pub fn new(window: Duration, max: usize) -> Self {
        SlidingWindow {
            window,
            max,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit for `key` and reports whether it is within quota.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let hits = entries.entry(key.to_string()).or_default();
        hits.retain(|t| now.duration_since(*t) < self.window);
        if hits.len() >= self.max {
            return false;
        }
        hits.push(now);
        true
    }
}
