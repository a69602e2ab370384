//! Configuration, status, and transport link types for the connection layer.

use std::time::Duration;

use copresence_config::CopresenceConfig;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the relay connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL of the relay.
    pub url: String,
    /// Attempts per connect cycle before the cycle fails.
    pub max_reconnect_attempts: u32,
    /// Base backoff delay, doubled per failed attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on a single backoff delay.
    pub max_reconnect_delay: Duration,
    /// Per-attempt handshake timeout.
    pub connect_timeout: Duration,
    /// WebSocket ping cadence.
    pub heartbeat_interval: Duration,
    /// Capacity of the outbound frame queue.
    pub outbound_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787/ws".into(),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
            max_reconnect_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(25),
            outbound_buffer: 64,
        }
    }
}

impl From<&CopresenceConfig> for ConnectionConfig {
    fn from(config: &CopresenceConfig) -> Self {
        Self {
            url: config.connection.url.clone(),
            max_reconnect_attempts: config.connection.max_reconnect_attempts,
            reconnect_delay: config.connection.reconnect_delay(),
            max_reconnect_delay: config.connection.max_reconnect_delay(),
            connect_timeout: config.connection.connect_timeout(),
            heartbeat_interval: config.connection.heartbeat_interval(),
            outbound_buffer: config.presence.outbound_buffer,
        }
    }
}

impl ConnectionConfig {
    /// Delay after the failed attempt number `attempt` (0-based).
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

// ---------------------------------------------------------------------------
// Transport link
// ---------------------------------------------------------------------------

/// One live transport session as seen by the connection layer: serialized
/// frames go out on `outbound`, frames from the relay arrive on `inbound`.
/// The inbound channel closing means the session is over.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}
