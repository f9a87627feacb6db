//! Per-message handling for each bridge.
//!
//! The subscriber owns one [`MessageHandler`] and feeds it every publish in
//! delivery order. Handlers never return errors: anything that goes wrong
//! with one message is logged here and the next message is processed
//! normally.

use serde_json::Value;
use tracing::{debug, info};

use crate::classify::{self, ClassifiedMessage};
use crate::notify::{Dispatcher, Notification};
use crate::sanitize::strip_control_sequences;
use crate::session::SessionManager;

/// Sound (Pushover) or tag (ntfy) attached to forwarded messages.
pub const FORWARD_SOUND: &str = "bell";

/// Consumer of broker messages.
pub trait MessageHandler: Send {
    /// Topic filters to subscribe to.
    fn topics(&self) -> Vec<String>;

    /// Process one message to completion.
    fn handle(&mut self, topic: &str, payload: &[u8]);

    /// Called once after the last message, before disconnecting.
    fn shutdown(&mut self) {}
}

/// The session logger: debug topic → session CSV files.
pub struct SessionPipeline {
    topic: String,
    manager: SessionManager,
}

impl SessionPipeline {
    pub fn new(topic: impl Into<String>, manager: SessionManager) -> Self {
        Self {
            topic: topic.into(),
            manager,
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }
}

impl MessageHandler for SessionPipeline {
    fn topics(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    fn handle(&mut self, topic: &str, payload: &[u8]) {
        let text = match classify::decode_text(payload) {
            Ok(text) => text,
            Err(e) => {
                debug!(
                    raw = %payload.escape_ascii(),
                    "{} on {} ({} bytes), ignoring",
                    e,
                    topic,
                    payload.len()
                );
                return;
            }
        };

        let sanitized = strip_control_sequences(text);

        match classify::classify(&sanitized) {
            ClassifiedMessage::Lifecycle(status) => {
                info!("device reported session {}", status);
                self.manager.on_status(status);
            }
            ClassifiedMessage::Sample(sample) => self.manager.record_sample(&sample),
            ClassifiedMessage::Unstructured(_) => {
                debug!(raw = ?text, sanitized = ?sanitized.as_ref(), "ignoring console output");
            }
        }
    }

    fn shutdown(&mut self) {
        self.manager.shutdown();
    }
}

/// A forwarder: every message → one notification.
pub struct ForwardPipeline {
    topics: Vec<String>,
    dispatcher: Dispatcher,
}

impl ForwardPipeline {
    pub fn new(topic: impl Into<String>, dispatcher: Dispatcher) -> Self {
        Self {
            topics: vec![topic.into()],
            dispatcher,
        }
    }
}

impl MessageHandler for ForwardPipeline {
    fn topics(&self) -> Vec<String> {
        self.topics.clone()
    }

    fn handle(&mut self, topic: &str, payload: &[u8]) {
        debug!("forwarding {} bytes from {}", payload.len(), topic);
        self.dispatcher.dispatch(forward_notification(topic, payload));
    }
}

/// Notification for one forwarded message.
pub fn forward_notification(topic: &str, payload: &[u8]) -> Notification {
    Notification::new(
        format!("Doorbell MQTT: {topic}"),
        format_forward_body(topic, payload),
    )
    .with_sound(FORWARD_SOUND)
}

/// `Topic: {topic}` followed by the payload, pretty-printed if it is JSON.
pub fn format_forward_body(topic: &str, payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);

    let body = match serde_json::from_str::<Value>(&text) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string()),
        Err(_) => text.into_owned(),
    };

    format!("Topic: {topic}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use crate::session::ManualClock;

    #[test]
    fn test_format_forward_body_pretty_prints_json() {
        let body = format_forward_body("doorbell/status", br#"{"state":"ringing","count":2}"#);
        assert_eq!(
            body,
            "Topic: doorbell/status\n{\n  \"state\": \"ringing\",\n  \"count\": 2\n}"
        );
    }

    #[test]
    fn test_format_forward_body_raw_text() {
        assert_eq!(
            format_forward_body("doorbell/log", b"Button pressed"),
            "Topic: doorbell/log\nButton pressed"
        );
    }

    #[test]
    fn test_format_forward_body_scalar_json() {
        assert_eq!(
            format_forward_body("doorbell/battery", b"87"),
            "Topic: doorbell/battery\n87"
        );
    }

    #[test]
    fn test_format_forward_body_invalid_utf8_is_lossy() {
        let body = format_forward_body("doorbell/raw", &[b'o', b'k', 0xff]);
        assert_eq!(body, "Topic: doorbell/raw\nok\u{FFFD}");
    }

    #[test]
    fn test_forward_pipeline_dispatches_every_message() {
        let (dispatcher, mut rx) = Dispatcher::channel();
        let mut pipeline = ForwardPipeline::new("doorbell/#", dispatcher);

        assert_eq!(pipeline.topics(), vec!["doorbell/#".to_string()]);

        pipeline.handle("doorbell/debug", b"\x1b[31mnot json\x1b[0m");
        pipeline.handle("doorbell/ring", b"{}");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.title, "Doorbell MQTT: doorbell/debug");
        assert_eq!(first.sound.as_deref(), Some("bell"));
        assert_eq!(
            first.message,
            "Topic: doorbell/debug\n\x1b[31mnot json\x1b[0m"
        );

        let second = rx.try_recv().unwrap();
        assert_eq!(second.message, "Topic: doorbell/ring\n{}");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_session_pipeline_routes_messages() {
        let temp_dir = TempDir::new().unwrap();
        let (dispatcher, mut rx) = Dispatcher::channel();
        let clock = ManualClock::new(Local.with_ymd_and_hms(2026, 10, 16, 7, 15, 2).unwrap());
        let manager =
            SessionManager::with_clock(temp_dir.path(), dispatcher, Box::new(clock)).unwrap();
        let mut pipeline = SessionPipeline::new("doorbell/debug", manager);

        pipeline.handle("doorbell/debug", b"\x1b[32m{\"status\":\"started\"}\x1b[0m");
        let path = pipeline.manager().current_log().unwrap().to_path_buf();
        pipeline.handle("doorbell/debug", b"I (1234) wifi: connected");
        pipeline.handle("doorbell/debug", &[0xc3, 0x28]);
        pipeline.handle("doorbell/debug", br#"{"delta":10,"adc1_v":1.0,"adc2_v":0.5}"#);
        pipeline.handle("doorbell/debug", br#"{"status":"ended"}"#);

        assert!(!pipeline.manager().is_open());
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "delta_ms,adc1_v,adc2_v\n10,1.0,0.5\n"
        );
        assert_eq!(rx.try_recv().unwrap().title, crate::session::START_TITLE);
        assert_eq!(rx.try_recv().unwrap().title, crate::session::END_TITLE);
    }

    #[test]
    fn test_session_pipeline_shutdown_closes_log() {
        let temp_dir = TempDir::new().unwrap();
        let (dispatcher, mut rx) = Dispatcher::channel();
        let manager = SessionManager::new(temp_dir.path(), dispatcher).unwrap();
        let mut pipeline = SessionPipeline::new("doorbell/debug", manager);

        pipeline.handle("doorbell/debug", br#"{"status":"started"}"#);
        rx.try_recv().unwrap();

        pipeline.shutdown();
        assert!(!pipeline.manager().is_open());
        assert!(rx.try_recv().is_err());
    }
}
