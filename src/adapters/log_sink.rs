//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured monitor events to the log
//! facade, with enough context (topic, conversation id, key) to correlate a
//! log line with an event-store row.

use log::{info, warn};

use crate::app::events::MonitorEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`MonitorEvent`].
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &MonitorEvent) {
        match event {
            MonitorEvent::Seeded(state) => {
                info!("SEED  | initial_state={state}");
            }
            MonitorEvent::Transition {
                from,
                to,
                conversation_id,
            } => {
                info!("EVENT | {from} -> {to} | id={conversation_id}");
            }
            MonitorEvent::Reaffirmed {
                state,
                conversation_id,
            } => {
                info!("REAFF | state={state} | id={conversation_id}");
            }
            MonitorEvent::PublishFailed {
                topic,
                conversation_id,
            } => {
                warn!("PUBFAIL | topic={topic} | id={conversation_id}");
            }
            MonitorEvent::SensorFault(e) => {
                warn!("SENSOR | {e}");
            }
            MonitorEvent::FlagUpdated { timestamp, flag } => {
                info!("FLAG  | key={timestamp} | {:?}=true", flag);
            }
            MonitorEvent::Stopped => {
                info!("STOP  | monitor stopped");
            }
        }
    }
}
