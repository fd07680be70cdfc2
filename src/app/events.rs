//! Outbound monitor events.
//!
//! The [`StateMonitor`](super::monitor::StateMonitor) emits these through
//! the [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them — the shipped adapter writes them to
//! the log with enough context (topic, conversation id, key) to correlate
//! with the event store.

use super::monitor::DoorState;
use crate::error::SensorError;
use crate::store::DeliveryFlag;

/// Structured events emitted by the monitor core.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// First successful read seeded the steady state; nothing published.
    Seeded(DoorState),

    /// A state change was recorded and published.
    Transition {
        from: DoorState,
        to: DoorState,
        conversation_id: String,
    },

    /// An unchanged state was re-published because the latest record went
    /// stale (or a reaffirm command asked for it).
    Reaffirmed {
        state: DoorState,
        conversation_id: String,
    },

    /// A publish failed; the record is in the store and the staleness rule
    /// will re-surface it.
    PublishFailed {
        topic: String,
        conversation_id: String,
    },

    /// The digital input could not be read this tick.
    SensorFault(SensorError),

    /// A delivery flag was flipped after a dispatcher side effect finished.
    FlagUpdated { timestamp: i64, flag: DeliveryFlag },

    /// The monitor observed its stop signal.
    Stopped,
}
