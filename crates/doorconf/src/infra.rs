//! Infrastructure configuration - broker, filesystem, telemetry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// MQTT broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname or IP address.
    /// Default: localhost
    #[serde(default = "MqttConfig::default_broker")]
    pub broker: String,

    /// Broker TCP port.
    /// Default: 1883
    #[serde(default = "MqttConfig::default_port")]
    pub port: u16,

    /// Username; credentials are only sent when both username and password are set.
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Root of the device topic tree.
    /// Default: doorbell
    #[serde(default = "MqttConfig::default_topic_prefix")]
    pub topic_prefix: String,

    /// MQTT keepalive interval in seconds.
    /// Default: 60
    #[serde(default = "MqttConfig::default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl MqttConfig {
    fn default_broker() -> String {
        "localhost".to_string()
    }

    fn default_port() -> u16 {
        1883
    }

    fn default_topic_prefix() -> String {
        "doorbell".to_string()
    }

    fn default_keep_alive_secs() -> u64 {
        60
    }

    /// Username and password, if both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((&self.username, &self.password))
        }
    }

    /// Build a topic filter under the configured prefix, e.g. `doorbell/debug`.
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.topic_prefix.trim_end_matches('/'), suffix)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: Self::default_broker(),
            port: Self::default_port(),
            username: String::new(),
            password: String::new(),
            topic_prefix: Self::default_topic_prefix(),
            keep_alive_secs: Self::default_keep_alive_secs(),
        }
    }
}

/// Filesystem paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory that receives one CSV file per recorded session.
    /// Default: ./sessions
    #[serde(default = "PathsConfig::default_sessions_dir")]
    pub sessions_dir: PathBuf,
}

impl PathsConfig {
    fn default_sessions_dir() -> PathBuf {
        PathBuf::from("sessions")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sessions_dir: Self::default_sessions_dir(),
        }
    }
}

/// Logging and observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// OTLP gRPC endpoint. Empty disables OpenTelemetry export.
    /// Default: "" (disabled)
    #[serde(default)]
    pub otlp_endpoint: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Whether OTLP export is enabled.
    pub fn otlp_enabled(&self) -> bool {
        !self.otlp_endpoint.trim().is_empty()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            otlp_endpoint: String::new(),
        }
    }
}

/// Infrastructure configuration - fixed for the lifetime of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mqtt_defaults() {
        let mqtt = MqttConfig::default();
        assert_eq!(mqtt.broker, "localhost");
        assert_eq!(mqtt.port, 1883);
        assert_eq!(mqtt.topic_prefix, "doorbell");
        assert_eq!(mqtt.keep_alive_secs, 60);
        assert!(mqtt.credentials().is_none());
    }

    #[test]
    fn test_credentials_need_both_fields() {
        let mut mqtt = MqttConfig {
            username: "door".to_string(),
            ..Default::default()
        };
        assert!(mqtt.credentials().is_none());

        mqtt.password = "bell".to_string();
        assert_eq!(mqtt.credentials(), Some(("door", "bell")));
    }

    #[test]
    fn test_topic_joins_prefix() {
        let mut mqtt = MqttConfig::default();
        assert_eq!(mqtt.topic("debug"), "doorbell/debug");
        assert_eq!(mqtt.topic("#"), "doorbell/#");

        mqtt.topic_prefix = "home/frontdoor/".to_string();
        assert_eq!(mqtt.topic("debug"), "home/frontdoor/debug");
    }

    #[test]
    fn test_telemetry_defaults() {
        let telemetry = TelemetryConfig::default();
        assert_eq!(telemetry.log_level, "info");
        assert!(!telemetry.otlp_enabled());
    }
}
