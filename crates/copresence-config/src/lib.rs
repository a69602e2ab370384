//! Copresence configuration system.
//!
//! TOML-based configuration for the presence client and relay. Every
//! section uses serde defaults, so a partial (or empty) file is valid and
//! the defaults reproduce the stock timing constants.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use copresence_config::load_config;
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config.connection.url);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    ConnectionSettings, CopresenceConfig, LogLevel, LoggingConfig, PresenceSettings,
};
pub use toml_loader::{
    create_default_config, default_config_path, load_default, load_from_path, CONFIG_PATH_ENV,
};

use copresence_common::ConfigError;

/// Load config from the platform default path and validate it.
pub fn load_config() -> Result<CopresenceConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}
