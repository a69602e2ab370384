//! Relay connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the client reaches the relay and how hard it retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// WebSocket URL of the relay.
    pub url: String,
    /// Attempts per connect cycle before giving up (valid range: 1-100).
    pub max_reconnect_attempts: u32,
    /// Base backoff delay in milliseconds, doubled per attempt.
    pub reconnect_delay_ms: u64,
    /// Upper bound on a single backoff delay.
    pub max_reconnect_delay_ms: u64,
    /// Per-attempt handshake timeout.
    pub connect_timeout_ms: u64,
    /// WebSocket ping cadence.
    pub heartbeat_interval_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787/ws".into(),
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
            connect_timeout_ms: 15_000,
            heartbeat_interval_secs: 25,
        }
    }
}

impl ConnectionSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
