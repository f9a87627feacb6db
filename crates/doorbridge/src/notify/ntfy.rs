//! ntfy backend: the message is the request body, metadata rides in headers.

use async_trait::async_trait;
use doorconf::NtfyConfig;
use reqwest::Client;
use tracing::debug;

use super::{check_response, Notification, Notifier, NotifyError, Priority, DELIVERY_TIMEOUT};

pub struct NtfyNotifier {
    client: Client,
    topic_url: String,
}

impl NtfyNotifier {
    pub fn from_config(config: &NtfyConfig) -> Result<Self, NotifyError> {
        if config.topic.trim().is_empty() {
            return Err(NotifyError::NotConfigured("ntfy", "topic must be set"));
        }

        let client = Client::builder().timeout(DELIVERY_TIMEOUT).build()?;

        Ok(Self {
            client,
            topic_url: config.topic_url(),
        })
    }

    pub fn topic_url(&self) -> &str {
        &self.topic_url
    }

    fn priority_value(priority: Priority) -> &'static str {
        match priority {
            Priority::Low => "low",
            Priority::Normal => "default",
            Priority::High => "high",
        }
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    fn name(&self) -> &'static str {
        "ntfy"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .post(&self.topic_url)
            .header("Priority", Self::priority_value(notification.priority))
            .body(notification.message.clone());

        if let Some(tag) = &notification.sound {
            request = request.header("Tags", tag.as_str());
        }

        // Header values must be visible ASCII; emoji titles go in the query string
        if notification.title.bytes().all(|b| (0x20..0x7f).contains(&b)) {
            request = request.header("Title", notification.title.as_str());
        } else {
            request = request.query(&[("title", notification.title.as_str())]);
        }

        let response = request.send().await?;
        let status = check_response(response).await?;
        debug!("ntfy responded with status {}", status);
        Ok(())
    }
}
