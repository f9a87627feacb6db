//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, DoorConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in load order (system, user, local).
///
/// Only existing files are returned. If `cli_path` is provided, it replaces the local override. A CLI path
/// that does not exist is still returned so loading it reports the error.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/doorbridge/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("doorbridge/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    let local = PathBuf::from("doorbridge.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Overlay the values set in a TOML file onto `config`.
pub fn apply_file(config: &mut DoorConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Overlay TOML onto `config`, field by field.
///
/// Only keys present in `contents` change `config`, so a later file that sets
/// one value leaves everything an earlier file set untouched.
pub fn apply_toml(config: &mut DoorConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    if let Some(mqtt) = table.get("mqtt").and_then(|v| v.as_table()) {
        let target = &mut config.infra.mqtt;
        if let Some(v) = mqtt.get("broker").and_then(|v| v.as_str()) {
            target.broker = v.to_string();
        }
        if let Some(v) = mqtt.get("port").and_then(|v| v.as_integer()) {
            target.port = u16::try_from(v)
                .map_err(|_| parse_error(format!("mqtt.port out of range: {v}")))?;
        }
        if let Some(v) = mqtt.get("username").and_then(|v| v.as_str()) {
            target.username = v.to_string();
        }
        if let Some(v) = mqtt.get("password").and_then(|v| v.as_str()) {
            target.password = v.to_string();
        }
        if let Some(v) = mqtt.get("topic_prefix").and_then(|v| v.as_str()) {
            target.topic_prefix = v.to_string();
        }
        if let Some(v) = mqtt.get("keep_alive_secs").and_then(|v| v.as_integer()) {
            target.keep_alive_secs = u64::try_from(v)
                .map_err(|_| parse_error(format!("mqtt.keep_alive_secs must be positive: {v}")))?;
        }
    }

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("sessions_dir").and_then(|v| v.as_str()) {
            config.infra.paths.sessions_dir = expand_path(v);
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.infra.telemetry.log_level = v.to_string();
        }
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.infra.telemetry.otlp_endpoint = v.to_string();
        }
    }

    if let Some(pushover) = table.get("pushover").and_then(|v| v.as_table()) {
        let target = &mut config.services.pushover;
        if let Some(v) = pushover.get("user_key").and_then(|v| v.as_str()) {
            target.user_key = v.to_string();
        }
        if let Some(v) = pushover.get("api_token").and_then(|v| v.as_str()) {
            target.api_token = v.to_string();
        }
        if let Some(v) = pushover.get("api_url").and_then(|v| v.as_str()) {
            target.api_url = v.to_string();
        }
    }

    if let Some(ntfy) = table.get("ntfy").and_then(|v| v.as_table()) {
        if let Some(v) = ntfy.get("server").and_then(|v| v.as_str()) {
            config.services.ntfy.server = v.to_string();
        }
        if let Some(v) = ntfy.get("topic").and_then(|v| v.as_str()) {
            config.services.ntfy.topic = v.to_string();
        }
    }

    Ok(())
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut DoorConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from an arbitrary lookup (the process environment in production).
fn apply_overrides_from(
    config: &mut DoorConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let mut applied = |key: &str| sources.env_overrides.push(key.to_string());

    // Broker
    if let Some(v) = lookup("DOORBRIDGE_MQTT_BROKER") {
        config.infra.mqtt.broker = v;
        applied("DOORBRIDGE_MQTT_BROKER");
    }
    if let Some(port) = lookup("DOORBRIDGE_MQTT_PORT").and_then(|v| v.parse().ok()) {
        config.infra.mqtt.port = port;
        applied("DOORBRIDGE_MQTT_PORT");
    }
    if let Some(v) = lookup("DOORBRIDGE_MQTT_USERNAME") {
        config.infra.mqtt.username = v;
        applied("DOORBRIDGE_MQTT_USERNAME");
    }
    if let Some(v) = lookup("DOORBRIDGE_MQTT_PASSWORD") {
        config.infra.mqtt.password = v;
        applied("DOORBRIDGE_MQTT_PASSWORD");
    }

    // Paths
    if let Some(v) = lookup("DOORBRIDGE_SESSIONS_DIR") {
        config.infra.paths.sessions_dir = expand_path(&v);
        applied("DOORBRIDGE_SESSIONS_DIR");
    }

    // Telemetry
    if let Some(v) = lookup("DOORBRIDGE_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        applied("DOORBRIDGE_LOG_LEVEL");
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        applied("RUST_LOG");
    }
    if let Some(v) = lookup("DOORBRIDGE_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v;
        applied("DOORBRIDGE_OTLP_ENDPOINT");
    }
    // Also support standard OTEL env var
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v;
        applied("OTEL_EXPORTER_OTLP_ENDPOINT");
    }

    // Notification services
    if let Some(v) = lookup("PUSHOVER_USER_KEY") {
        config.services.pushover.user_key = v;
        applied("PUSHOVER_USER_KEY");
    }
    if let Some(v) = lookup("PUSHOVER_API_TOKEN") {
        config.services.pushover.api_token = v;
        applied("PUSHOVER_API_TOKEN");
    }
    if let Some(v) = lookup("DOORBRIDGE_NTFY_SERVER") {
        config.services.ntfy.server = v;
        applied("DOORBRIDGE_NTFY_SERVER");
    }
    if let Some(v) = lookup("DOORBRIDGE_NTFY_TOPIC") {
        config.services.ntfy.topic = v;
        applied("DOORBRIDGE_NTFY_TOPIC");
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
