//! Pushover backend: form-encoded POST to the messages endpoint.

use async_trait::async_trait;
use doorconf::PushoverConfig;
use reqwest::Client;
use tracing::debug;

use super::{check_response, Notification, Notifier, NotifyError, Priority, DELIVERY_TIMEOUT};

pub struct PushoverNotifier {
    client: Client,
    api_url: String,
    user_key: String,
    api_token: String,
}

impl PushoverNotifier {
    /// Build from config. Fails if the user key or API token is missing.
    pub fn from_config(config: &PushoverConfig) -> Result<Self, NotifyError> {
        if !config.is_configured() {
            return Err(NotifyError::NotConfigured(
                "pushover",
                "user_key and api_token must both be set",
            ));
        }

        let client = Client::builder().timeout(DELIVERY_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            user_key: config.user_key.clone(),
            api_token: config.api_token.clone(),
        })
    }

    fn priority_value(priority: Priority) -> &'static str {
        match priority {
            Priority::Low => "-1",
            Priority::Normal => "0",
            Priority::High => "1",
        }
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    fn name(&self) -> &'static str {
        "pushover"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("token", self.api_token.as_str()),
            ("user", self.user_key.as_str()),
            ("title", notification.title.as_str()),
            ("message", notification.message.as_str()),
            ("priority", Self::priority_value(notification.priority)),
        ];
        if let Some(sound) = &notification.sound {
            form.push(("sound", sound.as_str()));
        }

        let response = self.client.post(&self.api_url).form(&form).send().await?;
        let status = check_response(response).await?;
        debug!("pushover responded with status {}", status);
        Ok(())
    }
}
