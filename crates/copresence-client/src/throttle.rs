//! Per-key minimum-interval gate for high-frequency updates.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Drops updates that arrive sooner than `interval` after the last
/// accepted update for the same key. A dropped update does not move the
/// window; the next one after the interval is accepted.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_accepted: HashMap<String, Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: HashMap::new(),
        }
    }

    /// Returns true (and records `now`) when the update for `key` passes.
    pub fn allow(&mut self, key: &str, now: Instant) -> bool {
        if let Some(prev) = self.last_accepted.get(key) {
            if now.saturating_duration_since(*prev) < self.interval {
                return false;
            }
        }
        self.last_accepted.insert(key.to_string(), now);
        true
    }

    pub fn forget(&mut self, key: &str) {
        self.last_accepted.remove(key);
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.last_accepted.retain(|key, _| keep(key));
    }

    pub fn clear(&mut self) {
        self.last_accepted.clear();
    }
}
