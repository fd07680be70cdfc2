//! Error types for the doorwatch daemon.
//!
//! One typed enum per subsystem; each carries enough context to log without
//! a backtrace. Construction failures are fatal and propagate to startup
//! (where the binary wraps them with `anyhow`); faults inside a single poll
//! tick or a single notification are contained at that boundary and logged.

use std::fmt;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Configuration is invalid or could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The input device could not be read.
    ReadFailed(String),
    /// The device returned a level outside the two-valued domain.
    InvalidLevel(String),
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(msg) => write!(f, "read failed: {msg}"),
            Self::InvalidLevel(raw) => write!(f, "invalid level {raw:?}"),
        }
    }
}

impl std::error::Error for SensorError {}

// ---------------------------------------------------------------------------
// Event-store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An existing table's shape is incompatible with the requested schema.
    Schema(String),
    /// A keyed update targeted a record that does not exist.
    NotFound(i64),
    /// The backing engine rejected the operation.
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema(msg) => write!(f, "schema mismatch: {msg}"),
            Self::NotFound(key) => write!(f, "no record with key {key}"),
            Self::Backend(msg) => write!(f, "backend: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Payload codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// The template references a placeholder the caller did not supply.
    MissingKey(String),
    /// No topic with this name is configured.
    UnknownTopic(String),
    /// The topic exists but has the wrong direction for the operation.
    WrongDirection(String),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey(key) => write!(f, "missing substitution key '{key}'"),
            Self::UnknownTopic(name) => write!(f, "unknown topic '{name}'"),
            Self::WrongDirection(name) => write!(f, "topic '{name}' has the wrong direction"),
        }
    }
}

impl std::error::Error for PayloadError {}

// ---------------------------------------------------------------------------
// Messaging errors
// ---------------------------------------------------------------------------

/// Broker failures mapped to a small fixed taxonomy. Callers never see a
/// bare numeric return code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// The broker refused the connection (bad credentials, bad client id).
    ConnectionRefused(String),
    /// The client's in-flight message limit was hit.
    TooManyInFlight,
    /// The payload could not be encoded for the wire.
    InvalidPayload(String),
    /// The requested QoS level is not representable on the wire.
    UnsupportedQos(u8),
    /// The connection dropped mid-operation.
    Disconnected,
    /// Anything the taxonomy does not name.
    Other(String),
}

impl fmt::Display for MessagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionRefused(msg) => write!(f, "connection refused: {msg}"),
            Self::TooManyInFlight => write!(f, "too many in-flight messages"),
            Self::InvalidPayload(msg) => write!(f, "invalid payload: {msg}"),
            Self::UnsupportedQos(q) => write!(f, "unsupported QoS level {q}"),
            Self::Disconnected => write!(f, "broker disconnected"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for MessagingError {}

