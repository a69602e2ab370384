//! Core TOML config loading: read from path or platform default.

use crate::schema::CopresenceConfig;
use crate::validation;
use copresence_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

use super::paths::{create_default_config, default_config_path};

/// Load config from a specific TOML file path.
///
/// Missing fields take serde defaults. A config that fails validation is
/// logged and replaced by the defaults, so a typo in a tuning knob never
/// disables presence.
pub fn load_from_path(path: &Path) -> Result<CopresenceConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: CopresenceConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
        warn!("falling back to default config");
        return Ok(CopresenceConfig::default());
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from [`default_config_path`]: `$COPRESENCE_CONFIG`, or
/// `~/.config/copresence/config.toml` on Linux.
///
/// If the file does not exist, creates a default config file and returns defaults.
pub fn load_default() -> Result<CopresenceConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            info!("no config found at {}, creating default", path.display());
            create_default_config(&path)?;
            Ok(CopresenceConfig::default())
        }
        Err(e) => Err(e),
    }
}
