//! Broker publish adapter.
//!
//! Implements [`PublishPort`] with one-shot connect-publish-disconnect
//! sessions ([`crate::mqtt::publish_single`]). The monitor publishes at
//! most a handful of messages per transition, so per-publish sessions keep
//! the write path stateless and failures cleanly scoped to one tick.

use crate::app::ports::PublishPort;
use crate::error::MessagingError;
use crate::mqtt::{publish_single, MqttSettings};
use crate::topics::Payload;

/// One-shot session publisher.
pub struct SinglePublisher {
    settings: MqttSettings,
}

impl SinglePublisher {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }
}

impl PublishPort for SinglePublisher {
    fn publish(&self, topic: &str, payload: &Payload, retain: bool) -> Result<(), MessagingError> {
        publish_single(&self.settings, topic, &payload.to_bytes(), retain)
    }
}
