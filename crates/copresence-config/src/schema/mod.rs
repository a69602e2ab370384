//! Configuration schema types.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod connection;
mod logging;
mod presence;

pub use connection::*;
pub use logging::*;
pub use presence::*;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CopresenceConfig {
    pub connection: ConnectionSettings,
    pub presence: PresenceSettings,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
