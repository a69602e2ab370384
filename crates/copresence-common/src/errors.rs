use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failure of a single transport attempt. Never surfaced past the
/// connection layer; it only feeds the retry counter.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),
}

/// Terminal outcome of a `connect()` cycle. Shared by every caller
/// awaiting the same attempt, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("gave up after {attempts} connection attempts: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },

    #[error("connection attempt cancelled by disconnect")]
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("presence session is already active")]
    AlreadyActive,

    #[error("presence session is not active")]
    NotActive,

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

#[derive(Debug, thiserror::Error)]
pub enum CopresenceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
