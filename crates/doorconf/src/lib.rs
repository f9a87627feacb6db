//! Minimal configuration loading for the doorbell bridges.
//!
//! Every bridge reads the same file, so the broker, the notification
//! services and the sessions directory are configured once.
//!
//! # Usage
//!
//! ```rust,no_run
//! use doorconf::DoorConfig;
//!
//! let (config, _sources) = DoorConfig::load_with_sources_from(None).expect("Failed to load config");
//!
//! println!("Broker: {}:{}", config.infra.mqtt.broker, config.infra.mqtt.port);
//! println!("Sessions: {}", config.infra.paths.sessions_dir.display());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/doorbridge/config.toml` (system)
//! 2. `~/.config/doorbridge/config.toml` (user)
//! 3. `./doorbridge.toml` (local override, replaced by `--config`)
//! 4. Environment variables (`DOORBRIDGE_*`, `PUSHOVER_*`)
//!
//! # Example Config
//!
//! ```toml
//! [mqtt]
//! broker = "192.168.1.40"
//! port = 1883
//!
//! [paths]
//! sessions_dir = "~/doorbell/sessions"
//!
//! [pushover]
//! user_key = "u..."
//! api_token = "a..."
//!
//! [ntfy]
//! topic = "doorbell"
//! ```

pub mod infra;
pub mod loader;
pub mod services;

pub use infra::{InfraConfig, MqttConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use services::{NtfyConfig, PushoverConfig, ServicesConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const REDACTED: &str = "********";

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file {0} already exists")]
    AlreadyExists(PathBuf),

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(flatten)]
    pub services: ServicesConfig,
}

impl DoorConfig {
    /// Load configuration and report where it came from.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/doorbridge/config.toml`
    /// 3. `~/.config/doorbridge/config.toml`
    /// 4. `./doorbridge.toml`, or `config_path` in its place
    /// 5. Environment variables
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = DoorConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Write a default config file to `path`.
    ///
    /// Refuses to overwrite an existing file.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path, DoorConfig::default().to_toml()).map_err(|e| {
            ConfigError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            }
        })
    }

    /// Copy of this config with passwords and API secrets masked.
    pub fn redacted(&self) -> Self {
        fn mask(value: &str) -> String {
            if value.is_empty() {
                String::new()
            } else {
                REDACTED.to_string()
            }
        }

        let mut config = self.clone();
        config.infra.mqtt.password = mask(&config.infra.mqtt.password);
        config.services.pushover.user_key = mask(&config.services.pushover.user_key);
        config.services.pushover.api_token = mask(&config.services.pushover.api_token);
        config
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();

        output.push_str("# Doorbell bridge configuration\n\n");

        let mqtt = &self.infra.mqtt;
        output.push_str("[mqtt]\n");
        output.push_str(&format!("broker = {}\n", quote(&mqtt.broker)));
        output.push_str(&format!("port = {}\n", mqtt.port));
        output.push_str(&format!("username = {}\n", quote(&mqtt.username)));
        output.push_str(&format!("password = {}\n", quote(&mqtt.password)));
        output.push_str(&format!("topic_prefix = {}\n", quote(&mqtt.topic_prefix)));
        output.push_str(&format!("keep_alive_secs = {}\n", mqtt.keep_alive_secs));

        output.push_str("\n[paths]\n");
        output.push_str(&format!(
            "sessions_dir = {}\n",
            quote(&self.infra.paths.sessions_dir.display().to_string())
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = {}\n",
            quote(&self.infra.telemetry.log_level)
        ));
        output.push_str(&format!(
            "otlp_endpoint = {}\n",
            quote(&self.infra.telemetry.otlp_endpoint)
        ));

        let pushover = &self.services.pushover;
        output.push_str("\n[pushover]\n");
        output.push_str(&format!("user_key = {}\n", quote(&pushover.user_key)));
        output.push_str(&format!("api_token = {}\n", quote(&pushover.api_token)));
        output.push_str(&format!("api_url = {}\n", quote(&pushover.api_url)));

        output.push_str("\n[ntfy]\n");
        output.push_str(&format!("server = {}\n", quote(&self.services.ntfy.server)));
        output.push_str(&format!("topic = {}\n", quote(&self.services.ntfy.topic)));

        output
    }
}

/// Render a TOML basic string, escaping quotes and backslashes.
fn quote(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DoorConfig::default();
        assert_eq!(config.infra.mqtt.port, 1883);
        assert_eq!(config.infra.paths.sessions_dir, PathBuf::from("sessions"));
        assert!(!config.services.pushover.is_configured());
    }

    #[test]
    fn test_to_toml() {
        let config = DoorConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[mqtt]"));
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[pushover]"));
        assert!(toml.contains("topic = \"doorbell\""));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let mut config = DoorConfig::default();
        config.infra.mqtt.broker = "192.168.1.40".to_string();
        config.infra.mqtt.password = "quote\"d".to_string();
        config.services.ntfy.topic = "frontdoor".to_string();

        let mut parsed = DoorConfig::default();
        loader::apply_toml(&mut parsed, &config.to_toml(), Path::new("roundtrip.toml")).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = DoorConfig::default();
        config.infra.mqtt.password = "hunter2".to_string();
        config.services.pushover.api_token = "token".to_string();

        let redacted = config.redacted();
        assert_eq!(redacted.infra.mqtt.password, REDACTED);
        assert_eq!(redacted.services.pushover.api_token, REDACTED);
        // Unset secrets stay empty so "not configured" remains visible
        assert_eq!(redacted.services.pushover.user_key, "");
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/doorbridge.toml");

        DoorConfig::write_default(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[mqtt]"));

        let err = DoorConfig::write_default(&path).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists(_)));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[ntfy]\ntopic = \"porch\"\n").unwrap();

        let (config, sources) = DoorConfig::load_with_sources_from(Some(&path)).unwrap();
        assert_eq!(config.services.ntfy.topic, "porch");
        assert!(sources.files.contains(&path));
    }
}
