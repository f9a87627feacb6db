//! doorbridge - MQTT bridges for the doorbell
//!
//! The doorbell publishes its console output, ADC samples and session
//! markers on `doorbell/debug`, and everything else under `doorbell/`.
//! This crate turns that stream into:
//!
//! - **Session logs**: one CSV file per recording session
//!   ([`session::SessionManager`], [`recorder::SessionLog`])
//! - **Push notifications**: session start/end, or every message forwarded
//!   verbatim ([`notify`])
//!
//! ```text
//! broker ──► subscriber ──► MessageHandler
//!                              ├─ SessionPipeline: decode → sanitize → classify → SessionManager
//!                              └─ ForwardPipeline: format → Dispatcher
//! ```

pub mod classify;
pub mod notify;
pub mod pipeline;
pub mod recorder;
pub mod sanitize;
pub mod session;
pub mod subscriber;
pub mod telemetry;

pub use classify::{ClassifiedMessage, LifecycleStatus, Sample};
pub use notify::{Dispatcher, Notification, Notifier, NotifyError};
pub use pipeline::{ForwardPipeline, MessageHandler, SessionPipeline};
pub use recorder::{SessionError, SessionLog};
pub use session::{Clock, SessionManager, SystemClock};
