//! Port traits — the boundary between the monitor core and the outside
//! world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ StateMonitor (domain)
//! ```
//!
//! Driven adapters (GPIO input, broker client, camera, push delivery, wall
//! clock, event sinks) implement these traits. The monitor consumes them
//! via generics, so the domain core never touches hardware or the network
//! directly. Callers depend on the trait, never on a concrete adapter.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{MessagingError, SensorError};
use crate::topics::Payload;

// ───────────────────────────────────────────────────────────────
// Digital input port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Instantaneous boolean level of the sensor pin.
pub trait SensorPort {
    /// Read the pin. Transient faults are expected from electrically noisy
    /// hardware; the monitor logs them and retries on the next tick.
    fn read(&mut self) -> Result<bool, SensorError>;

    /// Release the pin. Must tolerate being called on an already-cleaned
    /// component without raising.
    fn cleanup(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Publish port (domain → broker)
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget publish of one rendered payload.
pub trait PublishPort {
    fn publish(&self, topic: &str, payload: &Payload, retain: bool)
        -> Result<(), MessagingError>;
}

// ───────────────────────────────────────────────────────────────
// Camera port (driven adapter: domain → capture hardware)
// ───────────────────────────────────────────────────────────────

/// Errors from [`CameraPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No capture capability is configured.
    Unconfigured,
    /// The capture program could not be started.
    CommandFailed(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "no capture command configured"),
            Self::CommandFailed(msg) => write!(f, "capture command failed: {msg}"),
        }
    }
}

/// Triggers an image capture correlated with one transition.
pub trait CameraPort: Send + Sync {
    /// Start a capture and return the path where the artifact will appear.
    /// The artifact may not exist yet when this returns — the dispatcher
    /// waits for it with a bounded timeout.
    fn capture(&self, conversation_id: &str) -> Result<PathBuf, CaptureError>;
}

// ───────────────────────────────────────────────────────────────
// Notifier port (driven adapter: domain → push delivery)
// ───────────────────────────────────────────────────────────────

/// Errors from [`NotifierPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// No delivery capability is configured.
    Unconfigured,
    /// The delivery program failed or exited non-zero.
    CommandFailed(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "no notify command configured"),
            Self::CommandFailed(msg) => write!(f, "notify command failed: {msg}"),
        }
    }
}

/// Push-notification delivery. Best-effort: the dispatcher catches every
/// failure at its boundary.
pub trait NotifierPort: Send + Sync {
    fn send_text(&self, text: &str) -> Result<(), NotifyError>;
    fn send_file(&self, path: &Path) -> Result<(), NotifyError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port (domain → wall clock)
// ───────────────────────────────────────────────────────────────

/// Wall-clock seconds since epoch. Injected so tests can step time through
/// the staleness window deterministically.
pub trait ClockPort {
    fn now_epoch(&self) -> i64;
}

// ───────────────────────────────────────────────────────────────
// Dispatch port (domain → per-transition side effects)
// ───────────────────────────────────────────────────────────────

/// Hands a confirmed transition to the notification machinery. Must not
/// block the monitor loop and must not propagate failures into it.
pub trait DispatchPort {
    fn dispatch(&self, state: super::monitor::DoorState, conversation_id: &str, timestamp: i64);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / observability)
// ───────────────────────────────────────────────────────────────

/// The monitor emits structured [`MonitorEvent`](super::events::MonitorEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::MonitorEvent);
}
