//! Full configuration validation.
//!
//! Validates numeric ranges and cross-field constraints, collecting every
//! violation into a single `ConfigError`.

mod helpers;


use crate::schema::CopresenceConfig;
use copresence_common::ConfigError;

use helpers::validate_range;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &CopresenceConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_connection(&mut errors, config);
    validate_presence(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_connection(errors: &mut Vec<String>, config: &CopresenceConfig) {
    let c = &config.connection;

    if !(c.url.starts_with("ws://") || c.url.starts_with("wss://")) {
        errors.push(format!(
            "connection.url = {:?} must start with ws:// or wss://",
            c.url
        ));
    }
    validate_range(
        errors,
        "connection.max_reconnect_attempts",
        u64::from(c.max_reconnect_attempts),
        1,
        100,
    );
    validate_range(errors, "connection.reconnect_delay_ms", c.reconnect_delay_ms, 10, 60_000);
    if c.max_reconnect_delay_ms < c.reconnect_delay_ms {
        errors.push(format!(
            "connection.max_reconnect_delay_ms = {} is below connection.reconnect_delay_ms = {}",
            c.max_reconnect_delay_ms, c.reconnect_delay_ms
        ));
    }
    validate_range(errors, "connection.connect_timeout_ms", c.connect_timeout_ms, 100, 120_000);
    validate_range(
        errors,
        "connection.heartbeat_interval_secs",
        c.heartbeat_interval_secs,
        1,
        300,
    );
}

fn validate_presence(errors: &mut Vec<String>, config: &CopresenceConfig) {
    let p = &config.presence;

    validate_range(errors, "presence.cursor_throttle_ms", p.cursor_throttle_ms, 0, 5_000);
    validate_range(errors, "presence.idle_timeout_ms", p.idle_timeout_ms, 1_000, 3_600_000);
    validate_range(
        errors,
        "presence.outbound_buffer",
        p.outbound_buffer as u64,
        1,
        4_096,
    );
}
