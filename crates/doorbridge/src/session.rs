//! Session lifecycle manager.
//!
//! The device announces recording sessions with `{"status":"started"}` and
//! `{"status":"ended"}` on its debug topic, and streams ADC samples in
//! between. [`SessionManager`] turns that stream into one CSV file per
//! session and a pair of push notifications.
//!
//! ## Lifecycle
//!
//! ```text
//!            started                     ended
//! Closed ──────────────► Open ─────────────────────► Closed
//!   ▲  ended: no-op       │ │ sample: append + flush
//!   │  sample: dropped    │ │ started: close current, open new
//!   └─────────────────────┘ └ write error: abort, no notification
//! ```
//!
//! At most one session is open. Notifications go through a [`Dispatcher`],
//! so a slow notification service never delays sample recording.

use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeDelta};
use tracing::{debug, error, info, warn};

use crate::classify::{LifecycleStatus, Sample};
use crate::notify::{Dispatcher, Notification};
use crate::recorder::{SessionError, SessionLog};

pub const START_TITLE: &str = "🔔 Session Start";
pub const START_MESSAGE: &str = "Doorbell session started";
pub const END_TITLE: &str = "🔔 Session End";

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub(crate) fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Format a duration as `H:MM:SS`, with a day count past 24 hours.
///
/// Sub-second precision is dropped; negative durations (clock stepped
/// backwards) render as `0:00:00`.
pub fn format_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    match days {
        0 => format!("{hours}:{minutes:02}:{seconds:02}"),
        1 => format!("1 day, {hours}:{minutes:02}:{seconds:02}"),
        _ => format!("{days} days, {hours}:{minutes:02}:{seconds:02}"),
    }
}

/// Message body for the end-of-session notification.
pub fn end_message(duration: TimeDelta) -> String {
    format!("Session ended (Duration: {})", format_duration(duration))
}

/// A session that is currently recording.
#[derive(Debug)]
struct OpenSession {
    started_at: DateTime<Local>,
    log: SessionLog,
}

#[derive(Debug, Default)]
enum SessionState {
    #[default]
    Closed,
    Open(OpenSession),
}

/// Owns the single recording session and its log file.
pub struct SessionManager {
    sessions_dir: PathBuf,
    dispatcher: Dispatcher,
    clock: Box<dyn Clock>,
    state: SessionState,
}

impl SessionManager {
    /// Create a manager writing into `sessions_dir`, creating it if needed.
    pub fn new(sessions_dir: impl Into<PathBuf>, dispatcher: Dispatcher) -> Result<Self, SessionError> {
        Self::with_clock(sessions_dir, dispatcher, Box::new(SystemClock))
    }

    pub fn with_clock(
        sessions_dir: impl Into<PathBuf>,
        dispatcher: Dispatcher,
        clock: Box<dyn Clock>,
    ) -> Result<Self, SessionError> {
        let sessions_dir = sessions_dir.into();
        std::fs::create_dir_all(&sessions_dir).map_err(|e| SessionError::CreateDir {
            path: sessions_dir.clone(),
            source: e,
        })?;

        Ok(Self {
            sessions_dir,
            dispatcher,
            clock,
            state: SessionState::Closed,
        })
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    /// Path of the open session's log, if any.
    pub fn current_log(&self) -> Option<&Path> {
        match &self.state {
            SessionState::Open(session) => Some(session.log.path()),
            SessionState::Closed => None,
        }
    }

    /// Apply a lifecycle event.
    pub fn on_status(&mut self, status: LifecycleStatus) {
        match status {
            LifecycleStatus::Started => {
                if self.is_open() {
                    warn!("session started while another is open; closing the previous one");
                    self.end_session();
                }
                self.start_session();
            }
            LifecycleStatus::Ended => {
                if self.is_open() {
                    self.end_session();
                } else {
                    debug!("session ended while none is open; ignoring");
                }
            }
        }
    }

    /// Append a sample to the open session, or drop it.
    pub fn record_sample(&mut self, sample: &Sample) {
        let SessionState::Open(session) = &mut self.state else {
            debug!("no open session, dropping sample {}", sample.to_csv_row());
            return;
        };

        if let Err(e) = session.log.append(sample) {
            error!("{}; abandoning session", e);
            // Dropping the handle releases the file; no end notification for an aborted session
            self.state = SessionState::Closed;
        }
    }

    /// Close any open session without notifying. Used at process exit.
    pub fn shutdown(&mut self) {
        if let SessionState::Open(session) = std::mem::take(&mut self.state) {
            match session.log.close() {
                Ok(closed) => info!(
                    "closed session log {} on shutdown ({} samples)",
                    closed.path.display(),
                    closed.samples
                ),
                Err(e) => error!("{}", e),
            }
        }
    }

    fn start_session(&mut self) {
        let started_at = self.clock.now();

        match SessionLog::create(&self.sessions_dir, &started_at) {
            Ok(log) => {
                info!("session started, logging to {}", log.path().display());
                self.state = SessionState::Open(OpenSession { started_at, log });
                self.dispatcher
                    .dispatch(Notification::new(START_TITLE, START_MESSAGE));
            }
            Err(e) => {
                error!("{}; session will not be recorded", e);
            }
        }
    }

    fn end_session(&mut self) {
        let SessionState::Open(session) = std::mem::take(&mut self.state) else {
            return;
        };

        let duration = self.clock.now() - session.started_at;

        match session.log.close() {
            Ok(closed) => info!(
                "session ended after {} ({} samples in {})",
                format_duration(duration),
                closed.samples,
                closed.path.display()
            ),
            Err(e) => error!("{}", e),
        }

        self.dispatcher
            .dispatch(Notification::new(END_TITLE, end_message(duration)));
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
