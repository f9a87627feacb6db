//! Push-notification service credentials and endpoints.

use serde::{Deserialize, Serialize};

/// Pushover API credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushoverConfig {
    #[serde(default)]
    pub user_key: String,

    #[serde(default)]
    pub api_token: String,

    /// Messages endpoint.
    /// Default: https://api.pushover.net/1/messages.json
    #[serde(default = "PushoverConfig::default_api_url")]
    pub api_url: String,
}

impl PushoverConfig {
    fn default_api_url() -> String {
        "https://api.pushover.net/1/messages.json".to_string()
    }

    /// Both the user key and the API token are present.
    pub fn is_configured(&self) -> bool {
        !self.user_key.trim().is_empty() && !self.api_token.trim().is_empty()
    }
}

impl Default for PushoverConfig {
    fn default() -> Self {
        Self {
            user_key: String::new(),
            api_token: String::new(),
            api_url: Self::default_api_url(),
        }
    }
}

/// ntfy server and topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NtfyConfig {
    /// Default: https://ntfy.sh
    #[serde(default = "NtfyConfig::default_server")]
    pub server: String,

    /// Default: doorbell
    #[serde(default = "NtfyConfig::default_topic")]
    pub topic: String,
}

impl NtfyConfig {
    fn default_server() -> String {
        "https://ntfy.sh".to_string()
    }

    fn default_topic() -> String {
        "doorbell".to_string()
    }

    /// Full publish URL, e.g. `https://ntfy.sh/doorbell`.
    pub fn topic_url(&self) -> String {
        format!(
            "{}/{}",
            self.server.trim_end_matches('/'),
            self.topic.trim_start_matches('/')
        )
    }
}

impl Default for NtfyConfig {
    fn default() -> Self {
        Self {
            server: Self::default_server(),
            topic: Self::default_topic(),
        }
    }
}

/// Notification services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub pushover: PushoverConfig,

    #[serde(default)]
    pub ntfy: NtfyConfig,
}
