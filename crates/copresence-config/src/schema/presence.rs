//! Presence timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// Minimum interval between accepted cursor updates per user.
    pub cursor_throttle_ms: u64,
    /// Inactivity before the local user is declared idle.
    pub idle_timeout_ms: u64,
    /// Capacity of the bounded outbound frame queue.
    pub outbound_buffer: usize,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            cursor_throttle_ms: 50,
            idle_timeout_ms: 30_000,
            outbound_buffer: 64,
        }
    }
}

impl PresenceSettings {
    pub fn cursor_throttle(&self) -> Duration {
        Duration::from_millis(self.cursor_throttle_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}
