//! Messaging client — a thin wrapper around `rumqttc`.
//!
//! Two usage shapes, matching how the daemon talks to the broker:
//!
//! - [`publish_single`] — connect, publish, wait for the broker's ack,
//!   disconnect. Used by fire-and-forget callers (the monitor's publish
//!   path). Blocks briefly; failures come back as [`MessagingError`].
//! - [`Subscriber`] — a persistent connection on its own thread that
//!   subscribes to control topics and hands every incoming message to a
//!   callback. Re-subscribes after every reconnect.
//!
//! Broker return codes are mapped to the [`MessagingError`] taxonomy —
//! callers never see a bare numeric code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{
    Client, ConnectReturnCode, ConnectionError, Event, MqttOptions, Packet, QoS, StateError,
};

use crate::config::BrokerConfig;
use crate::error::MessagingError;

/// How many in-flight requests the client channel buffers.
const REQUEST_CAP: usize = 10;

/// Upper bound on events drained while waiting for a single publish to ack.
const SINGLE_PUBLISH_EVENT_BUDGET: usize = 64;

/// Pause between reconnect attempts after a subscriber connection error.
const RECONNECT_PAUSE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Connection parameters, detached from the config layer so the monitor can
/// own a copy.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keepalive: Duration,
    pub qos: QoS,
    pub retain: bool,
}

impl MqttSettings {
    pub fn from_config(config: &BrokerConfig) -> Result<Self, MessagingError> {
        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            client_id: config.client_id.clone(),
            keepalive: Duration::from_secs(config.keepalive_secs.max(5)),
            qos: qos_from_u8(config.qos)?,
            retain: config.retain,
        })
    }

    fn options(&self, id_suffix: &str) -> MqttOptions {
        let client_id = format!("{}{}", self.client_id, id_suffix);
        let mut opts = MqttOptions::new(client_id, self.host.clone(), self.port);
        opts.set_keep_alive(self.keepalive);
        opts
    }
}

/// Map a configured QoS number onto the protocol's levels.
pub fn qos_from_u8(qos: u8) -> Result<QoS, MessagingError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(MessagingError::UnsupportedQos(other)),
    }
}

// ---------------------------------------------------------------------------
// One-shot publish
// ---------------------------------------------------------------------------

/// Connect, publish one payload, wait for the broker's acknowledgement,
/// disconnect.
///
/// A distinct client id suffix keeps this short-lived session from kicking
/// the persistent subscriber off the broker.
pub fn publish_single(
    settings: &MqttSettings,
    topic: &str,
    payload: &[u8],
    retain: bool,
) -> Result<(), MessagingError> {
    let (client, mut connection) = Client::new(settings.options("-pub"), REQUEST_CAP);
    client
        .publish(topic, settings.qos, retain, payload)
        .map_err(|e| MessagingError::Other(format!("publish request: {e}")))?;
    client
        .disconnect()
        .map_err(|e| MessagingError::Other(format!("disconnect request: {e}")))?;

    // Drain the event loop until the publish is acked (or the session ends).
    // QoS 0 never acks, so a clean disconnect counts as done there.
    let mut acked = settings.qos == QoS::AtMostOnce;
    for (i, event) in connection.iter().enumerate() {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                check_connack(ack.code)?;
            }
            Ok(Event::Incoming(Packet::PubAck(_) | Packet::PubComp(_))) => {
                acked = true;
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                if acked {
                    return Ok(());
                }
            }
            Ok(_) => {}
            Err(e) => {
                // rumqttc ends a cleanly disconnected session with an error
                // event; treat that as completion when the ack arrived.
                if acked {
                    return Ok(());
                }
                return Err(map_connection_error(&e));
            }
        }
        if i >= SINGLE_PUBLISH_EVENT_BUDGET {
            return Err(MessagingError::Other(
                "publish not acknowledged within event budget".to_string(),
            ));
        }
    }
    if acked {
        Ok(())
    } else {
        Err(MessagingError::Disconnected)
    }
}

// ---------------------------------------------------------------------------
// Persistent subscriber
// ---------------------------------------------------------------------------

/// Optional lifecycle callbacks for the persistent subscriber. `on_connect`
/// fires after every accepted connect (including reconnects), before the
/// subscriptions are re-issued; `on_subscribe` fires when the broker
/// acknowledges one.
#[derive(Default)]
pub struct SubscriberHooks {
    pub on_connect: Option<Box<dyn Fn() + Send>>,
    pub on_subscribe: Option<Box<dyn Fn() + Send>>,
}

/// Long-lived subscriber running its own network I/O loop on a dedicated
/// thread.
pub struct Subscriber {
    client: Client,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Subscriber {
    /// Connect and subscribe to `topics`, invoking `on_message` for every
    /// incoming publish. Subscriptions are re-issued after each reconnect.
    pub fn start(
        settings: &MqttSettings,
        topics: Vec<String>,
        on_message: impl Fn(&str, &[u8]) + Send + 'static,
    ) -> Result<Self, MessagingError> {
        Self::start_with_hooks(settings, topics, SubscriberHooks::default(), on_message)
    }

    /// [`start`](Self::start) with lifecycle hooks attached.
    pub fn start_with_hooks(
        settings: &MqttSettings,
        topics: Vec<String>,
        hooks: SubscriberHooks,
        on_message: impl Fn(&str, &[u8]) + Send + 'static,
    ) -> Result<Self, MessagingError> {
        let (client, mut connection) = Client::new(settings.options("-sub"), REQUEST_CAP);
        let sub_client = client.clone();
        let qos = settings.qos;
        let running = Arc::new(AtomicBool::new(true));
        let loop_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("mqtt-sub".to_string())
            .spawn(move || {
                for event in connection.iter() {
                    // The disconnect request only reaches the broker over a
                    // live connection; the flag covers shutdown while the
                    // broker is unreachable.
                    if !loop_running.load(Ordering::SeqCst) {
                        info!("subscriber stop requested");
                        break;
                    }
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            if let Err(e) = check_connack(ack.code) {
                                warn!("subscriber connect rejected: {e}");
                                continue;
                            }
                            info!("subscriber connected, subscribing to {} topic(s)", topics.len());
                            if let Some(on_connect) = &hooks.on_connect {
                                on_connect();
                            }
                            for topic in &topics {
                                if let Err(e) = sub_client.subscribe(topic, qos) {
                                    warn!("subscribe '{}' failed: {e}", topic);
                                }
                            }
                        }
                        Ok(Event::Incoming(Packet::SubAck(_))) => {
                            debug!("subscription acknowledged");
                            if let Some(on_subscribe) = &hooks.on_subscribe {
                                on_subscribe();
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            on_message(&publish.topic, &publish.payload);
                        }
                        Ok(_) => {}
                        Err(ConnectionError::RequestsDone) => {
                            info!("subscriber shutting down");
                            break;
                        }
                        Err(e) => {
                            warn!("subscriber connection error: {}", map_connection_error(&e));
                            thread::sleep(RECONNECT_PAUSE);
                        }
                    }
                }
            })
            .map_err(|e| MessagingError::Other(format!("spawn mqtt-sub thread: {e}")))?;

        Ok(Self {
            client,
            running,
            handle: Some(handle),
        })
    }

    /// Disconnect and join the I/O thread. Tolerates being called after the
    /// connection is already gone, and returns even when the broker was
    /// never reachable.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.client.disconnect();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn check_connack(code: ConnectReturnCode) -> Result<(), MessagingError> {
    match code {
        ConnectReturnCode::Success => Ok(()),
        ConnectReturnCode::RefusedProtocolVersion => Err(MessagingError::ConnectionRefused(
            "protocol version".to_string(),
        )),
        ConnectReturnCode::BadClientId => {
            Err(MessagingError::ConnectionRefused("bad client id".to_string()))
        }
        ConnectReturnCode::ServiceUnavailable => Err(MessagingError::ConnectionRefused(
            "service unavailable".to_string(),
        )),
        ConnectReturnCode::BadUserNamePassword => Err(MessagingError::ConnectionRefused(
            "bad credentials".to_string(),
        )),
        ConnectReturnCode::NotAuthorized => {
            Err(MessagingError::ConnectionRefused("not authorized".to_string()))
        }
    }
}

fn map_connection_error(e: &ConnectionError) -> MessagingError {
    match e {
        ConnectionError::ConnectionRefused(code) => match check_connack(*code) {
            Err(mapped) => mapped,
            Ok(()) => MessagingError::Other("refused with success code".to_string()),
        },
        ConnectionError::MqttState(StateError::CollisionTimeout) => MessagingError::TooManyInFlight,
        ConnectionError::MqttState(state) => MessagingError::Other(format!("state: {state}")),
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => {
            MessagingError::Other("network timeout".to_string())
        }
        ConnectionError::Io(io) => MessagingError::Other(format!("io: {io}")),
        ConnectionError::RequestsDone => MessagingError::Disconnected,
        other => MessagingError::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_mapping_covers_the_protocol() {
        assert_eq!(qos_from_u8(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2).unwrap(), QoS::ExactlyOnce);
        assert_eq!(
            qos_from_u8(3).unwrap_err(),
            MessagingError::UnsupportedQos(3)
        );
    }

    #[test]
    fn connack_codes_map_to_taxonomy() {
        assert!(check_connack(ConnectReturnCode::Success).is_ok());
        let err = check_connack(ConnectReturnCode::NotAuthorized).unwrap_err();
        assert!(matches!(err, MessagingError::ConnectionRefused(_)));
        let err = check_connack(ConnectReturnCode::BadClientId).unwrap_err();
        assert!(matches!(err, MessagingError::ConnectionRefused(_)));
    }

    #[test]
    fn requests_done_maps_to_disconnected() {
        let mapped = map_connection_error(&ConnectionError::RequestsDone);
        assert_eq!(mapped, MessagingError::Disconnected);
    }

    #[test]
    fn collision_timeout_maps_to_too_many_in_flight() {
        let mapped =
            map_connection_error(&ConnectionError::MqttState(StateError::CollisionTimeout));
        assert_eq!(mapped, MessagingError::TooManyInFlight);
    }

    fn unreachable_settings() -> MqttSettings {
        let mut config = BrokerConfig::default();
        config.host = "127.0.0.1".to_string();
        config.port = 1; // nothing listens here
        MqttSettings::from_config(&config).unwrap()
    }

    #[test]
    fn shutdown_returns_even_when_the_broker_is_unreachable() {
        let subscriber =
            Subscriber::start(&unreachable_settings(), vec!["door/control".to_string()], |_, _| {})
                .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let mut subscriber = subscriber;
            subscriber.shutdown();
            let _ = tx.send(());
        });

        assert!(
            rx.recv_timeout(Duration::from_secs(5)).is_ok(),
            "shutdown must complete without a broker connection"
        );
    }

    #[test]
    fn lifecycle_hooks_stay_silent_without_a_connection() {
        let connected = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&connected);
        let hooks = SubscriberHooks {
            on_connect: Some(Box::new(move || flag.store(true, Ordering::SeqCst))),
            on_subscribe: None,
        };

        let mut subscriber = Subscriber::start_with_hooks(
            &unreachable_settings(),
            vec!["door/control".to_string()],
            hooks,
            |_, _| {},
        )
        .unwrap();
        thread::sleep(Duration::from_millis(100));
        subscriber.shutdown();

        assert!(!connected.load(Ordering::SeqCst));
    }

    #[test]
    fn settings_from_config_reject_bad_qos() {
        let mut config = BrokerConfig::default();
        config.qos = 7;
        assert!(MqttSettings::from_config(&config).is_err());
        config.qos = 1;
        let settings = MqttSettings::from_config(&config).unwrap();
        assert_eq!(settings.qos, QoS::AtLeastOnce);
        assert!(settings.retain);
    }
}
