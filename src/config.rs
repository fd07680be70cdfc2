//! System configuration parameters.
//!
//! All tunable parameters for the doorwatch daemon, materialized from a JSON
//! file before any component is constructed. Components receive the pieces
//! they need by value — there is no ambient global configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub broker: BrokerConfig,
    pub topics: TopicsConfig,
    pub dispatch: DispatchConfig,
    pub sensor: SensorConfig,
}

/// State-monitor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Poll period in milliseconds (default 1 Hz).
    pub poll_interval_ms: u64,
    /// Maximum age of the latest record before an unchanged state is
    /// re-published (seconds).
    pub staleness_threshold_secs: i64,
    /// Keep-last-N retention bound for the event table.
    pub retention_keep: usize,
    /// Path to the SQLite event store.
    pub db_path: String,
    /// Event table name.
    pub table: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            staleness_threshold_secs: 15,
            retention_keep: 2,
            db_path: "doorwatch.db".to_string(),
            table: "door_events".to_string(),
        }
    }
}

/// Broker connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keepalive_secs: u64,
    /// Default publish QoS (1 = at-least-once, 2 = exactly-once).
    pub qos: u8,
    /// Retain state publishes so new subscribers learn current state.
    pub retain: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id: "doorwatch".to_string(),
            keepalive_secs: 60,
            qos: 1,
            retain: true,
        }
    }
}

/// Topic templates, keyed by topic name. A template value of the form
/// `{name}` is a placeholder; any other string is a literal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub publish: BTreeMap<String, BTreeMap<String, String>>,
    pub subscribe: BTreeMap<String, BTreeMap<String, String>>,
}

/// Notification dispatcher tuning and capability commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long to wait for a capture artifact before giving up (seconds).
    pub capture_timeout_secs: u64,
    /// Settle delay when the artifact already exists at wait time (ms),
    /// protecting against reading a partially written prior capture.
    pub settle_ms: u64,
    /// Directory where capture artifacts appear.
    pub capture_dir: String,
    /// Capture program; `{path}` is replaced with the artifact path.
    pub capture_command: Vec<String>,
    /// Notify program; `{text}` / `{file}` are replaced per call.
    pub notify_command: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            capture_timeout_secs: 30,
            settle_ms: 500,
            capture_dir: "/tmp/doorwatch".to_string(),
            capture_command: Vec::new(),
            notify_command: Vec::new(),
        }
    }
}

/// Digital-input adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// GPIO line number (sysfs numbering).
    pub gpio: u32,
    /// Whether a high level means "open". Reed switches wired normally-closed
    /// read high when the magnet leaves, so this defaults to true.
    pub open_on_high: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            gpio: 17,
            open_on_high: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            broker: BrokerConfig::default(),
            topics: TopicsConfig::default(),
            dispatch: DispatchConfig::default(),
            sensor: SensorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// Missing fields fall back to defaults; a malformed file or unreadable
    /// path is a construction-time fault and propagates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ConfigError(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the monitor misbehave rather than
    /// silently clamping them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError("poll_interval_ms must be > 0".into()));
        }
        if self.monitor.retention_keep == 0 {
            return Err(ConfigError("retention_keep must be > 0".into()));
        }
        if self.monitor.staleness_threshold_secs <= 0 {
            return Err(ConfigError("staleness_threshold_secs must be > 0".into()));
        }
        if !(1..=2).contains(&self.broker.qos) {
            return Err(ConfigError("broker qos must be 1 or 2".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = Config::default();
        assert!(c.monitor.poll_interval_ms > 0);
        assert!(c.monitor.retention_keep > 0);
        assert!(c.monitor.staleness_threshold_secs > 0);
        assert!(c.broker.qos == 1 || c.broker.qos == 2);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn serde_roundtrip() {
        let c = Config::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(c.monitor.poll_interval_ms, c2.monitor.poll_interval_ms);
        assert_eq!(c.monitor.retention_keep, c2.monitor.retention_keep);
        assert_eq!(c.broker.host, c2.broker.host);
        assert_eq!(c.sensor.gpio, c2.sensor.gpio);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let json = r#"{ "broker": { "host": "10.0.0.2" } }"#;
        let c: Config = serde_json::from_str(json).unwrap();
        assert_eq!(c.broker.host, "10.0.0.2");
        assert_eq!(c.broker.port, 1883);
        assert_eq!(c.monitor.retention_keep, 2);
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut c = Config::default();
        c.monitor.poll_interval_ms = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn qos_zero_rejected() {
        let mut c = Config::default();
        c.broker.qos = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn load_missing_file_is_a_config_error() {
        let err = Config::load("/nonexistent/doorwatch.json").unwrap_err();
        assert!(err.to_string().contains("read /nonexistent/doorwatch.json"));
    }

    #[test]
    fn load_rejects_invalid_values_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doorwatch.json");
        std::fs::write(&path, r#"{ "monitor": { "poll_interval_ms": 0 } }"#).unwrap();
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err, ConfigError("poll_interval_ms must be > 0".into()));
    }

    #[test]
    fn load_reads_a_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doorwatch.json");
        std::fs::write(&path, r#"{ "broker": { "host": "10.0.0.2" } }"#).unwrap();
        let c = Config::load(&path).unwrap();
        assert_eq!(c.broker.host, "10.0.0.2");
        assert_eq!(c.monitor.retention_keep, 2);
    }

    #[test]
    fn topic_templates_deserialize() {
        let json = r#"{
            "topics": {
                "publish": { "door/state": { "state": "{state}", "id": "{convo_id}" } },
                "subscribe": { "door/control": { "command": "{command}" } }
            }
        }"#;
        let c: Config = serde_json::from_str(json).unwrap();
        assert_eq!(c.topics.publish.len(), 1);
        assert_eq!(
            c.topics.publish["door/state"]["state"],
            "{state}".to_string()
        );
        assert_eq!(c.topics.subscribe.len(), 1);
    }
}
