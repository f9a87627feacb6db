//! Push notifications.
//!
//! A [`Notifier`] knows how to deliver one [`Notification`] to a service.
//! The [`Dispatcher`] sits in front of it: callers hand notifications over
//! without waiting, and a single background task delivers them in order.
//! Delivery is best-effort. Failures are logged and dropped, never retried,
//! and so is anything that arrives while the queue is full.
//!
//! ```text
//! SessionManager ──dispatch()──► mpsc(256) ──► worker task ──send()──► Pushover / ntfy
//! ForwardPipeline ─┘
//! ```

pub mod ntfy;
pub mod pushover;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use ntfy::NtfyNotifier;
pub use pushover::PushoverNotifier;

/// Timeout for a single HTTP delivery.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifications that may wait for delivery before new ones are dropped.
pub const QUEUE_CAPACITY: usize = 256;

/// Notification urgency, mapped onto each service's own scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub priority: Priority,
    /// Pushover sound name, or ntfy tag.
    pub sound: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            priority: Priority::Normal,
            sound: None,
        }
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }
}

/// Errors from delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0} is not configured: {1}")]
    NotConfigured(&'static str, &'static str),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A push-notification backend.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Service name for logs.
    fn name(&self) -> &'static str;

    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Turn a non-2xx response into [`NotifyError::Rejected`].
pub(crate) async fn check_response(response: reqwest::Response) -> Result<u16, NotifyError> {
    let status = response.status();
    if status.is_success() {
        Ok(status.as_u16())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Non-blocking handle for queueing notifications.
///
/// Cheap to clone. Notifications queued through any clone are delivered in
/// the order they were queued. The queue holds at most [`QUEUE_CAPACITY`]
/// notifications; a slow or hung service sheds load instead of growing it.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Notification>,
}

impl Dispatcher {
    /// Start a delivery task for `notifier`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> (Self, DispatchWorker) {
        Self::spawn_with_capacity(notifier, QUEUE_CAPACITY)
    }

    pub(crate) fn spawn_with_capacity(
        notifier: Arc<dyn Notifier>,
        capacity: usize,
    ) -> (Self, DispatchWorker) {
        let (dispatcher, rx) = Self::channel_with_capacity(capacity);
        let handle = tokio::spawn(deliver_all(rx, notifier));
        (dispatcher, DispatchWorker { handle })
    }

    /// A dispatcher whose queue is read directly by the caller.
    pub fn channel() -> (Self, mpsc::Receiver<Notification>) {
        Self::channel_with_capacity(QUEUE_CAPACITY)
    }

    pub(crate) fn channel_with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a notification. Never blocks and never fails.
    pub fn dispatch(&self, notification: Notification) {
        debug!("queueing notification: {}", notification.title);
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => warn!(
                "notification queue full, dropping notification: {}",
                dropped.title
            ),
            Err(TrySendError::Closed(dropped)) => warn!(
                "notification worker stopped, dropping notification: {}",
                dropped.title
            ),
        }
    }
}

/// The background delivery task.
#[derive(Debug)]
pub struct DispatchWorker {
    handle: JoinHandle<()>,
}

impl DispatchWorker {
    /// Wait for queued notifications to drain.
    ///
    /// The queue only ends once every [`Dispatcher`] clone is dropped. After
    /// `timeout` the worker is aborted and anything still queued is lost.
    pub async fn finish(mut self, timeout: Duration) {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(())) => debug!("notification worker drained"),
            Ok(Err(e)) => warn!("notification worker failed: {}", e),
            Err(_) => {
                warn!(
                    "notification worker did not drain within {:?}, aborting",
                    timeout
                );
                self.handle.abort();
            }
        }
    }
}

async fn deliver_all(mut rx: mpsc::Receiver<Notification>, notifier: Arc<dyn Notifier>) {
    while let Some(notification) = rx.recv().await {
        deliver(notifier.as_ref(), &notification).await;
    }
    debug!("{} notification queue closed", notifier.name());
}

/// Send one notification and log the outcome. Errors are swallowed.
pub async fn deliver(notifier: &dyn Notifier, notification: &Notification) {
    match notifier.send(notification).await {
        Ok(()) => info!(
            "{} notification sent: {}",
            notifier.name(),
            notification.title
        ),
        Err(e) => warn!(
            "failed to send {} notification {:?}: {}",
            notifier.name(),
            notification.title,
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// Records notifications; fails any whose title contains "fail".
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            if notification.title.contains("fail") {
                return Err(NotifyError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    /// Blocks in `send` until the test releases it, then counts deliveries.
    struct GatedNotifier {
        gate: Semaphore,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for GatedNotifier {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
            self.delivered.lock().unwrap().push(notification.message.clone());
            Ok(())
        }
    }

    #[test]
    fn test_notification_builder() {
        let n = Notification::new("title", "body").with_sound("bell");
        assert_eq!(n.priority, Priority::Normal);
        assert_eq!(n.sound.as_deref(), Some("bell"));
    }

    #[test]
    fn test_full_queue_drops_new_notifications() {
        let (dispatcher, mut rx) = Dispatcher::channel_with_capacity(2);
        for message in ["one", "two", "three", "four"] {
            dispatcher.dispatch(Notification::new("t", message));
        }

        assert_eq!(rx.try_recv().unwrap().message, "one");
        assert_eq!(rx.try_recv().unwrap().message, "two");
        assert!(rx.try_recv().is_err());

        // Space frees up once the queue drains
        dispatcher.dispatch(Notification::new("t", "five"));
        assert_eq!(rx.try_recv().unwrap().message, "five");
    }

    #[tokio::test]
    async fn test_stalled_notifier_bounds_the_queue() {
        let notifier = Arc::new(GatedNotifier {
            gate: Semaphore::new(0),
            delivered: Mutex::new(Vec::new()),
        });
        let (dispatcher, worker) = Dispatcher::spawn_with_capacity(notifier.clone(), 4);

        // Single-threaded runtime: the worker has not run yet, so only the
        // first four fit and the rest are dropped without blocking
        for i in 0..10_000 {
            dispatcher.dispatch(Notification::new("t", i.to_string()));
        }
        drop(dispatcher);

        notifier.gate.add_permits(10_000);
        worker.finish(Duration::from_secs(5)).await;

        assert_eq!(
            *notifier.delivered.lock().unwrap(),
            vec!["0", "1", "2", "3"]
        );
    }

    #[test]
    fn test_channel_dispatcher_preserves_order() {
        let (dispatcher, mut rx) = Dispatcher::channel();
        dispatcher.dispatch(Notification::new("first", ""));
        dispatcher.clone().dispatch(Notification::new("second", ""));

        assert_eq!(rx.try_recv().unwrap().title, "first");
        assert_eq!(rx.try_recv().unwrap().title, "second");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dispatch_after_receiver_dropped_does_not_panic() {
        let (dispatcher, rx) = Dispatcher::channel();
        drop(rx);
        dispatcher.dispatch(Notification::new("lost", ""));
    }

    #[tokio::test]
    async fn test_worker_delivers_in_order_and_survives_failures() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, worker) = Dispatcher::spawn(notifier.clone());

        dispatcher.dispatch(Notification::new("one", ""));
        dispatcher.dispatch(Notification::new("will fail", ""));
        dispatcher.dispatch(Notification::new("two", ""));
        drop(dispatcher);

        worker.finish(Duration::from_secs(5)).await;

        let titles: Vec<String> = notifier
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.title.clone())
            .collect();
        assert_eq!(titles, vec!["one", "two"]);
    }
}
