//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Copresence Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[connection]
# url = "ws://127.0.0.1:8787/ws"
# max_reconnect_attempts = 5     # 1-100
# reconnect_delay_ms = 1000      # 10-60000, doubled per attempt
# max_reconnect_delay_ms = 30000 # >= reconnect_delay_ms
# connect_timeout_ms = 15000     # 100-120000
# heartbeat_interval_secs = 25   # 1-300

[presence]
# cursor_throttle_ms = 50        # 0-5000
# idle_timeout_ms = 30000        # 1000-3600000
# outbound_buffer = 64           # 1-4096

[logging]
# level = "info"                 # trace, debug, info, warn, error
"##
    .to_string()
}
