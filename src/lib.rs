//! Doorwatch library.
//!
//! Monitors a binary door sensor on a digital input, keeps a deduplicated,
//! retention-bounded history of transitions in SQLite, and publishes each
//! confirmed transition over MQTT for downstream consumers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Adapters (outer ring)                  │
//! │                                                          │
//! │  SysfsGpio     SinglePublisher   CommandCamera           │
//! │  (SensorPort)  (PublishPort)     (CameraPort)            │
//! │  CommandNotifier  SystemClock    LogEventSink            │
//! │  (NotifierPort)   (ClockPort)    (EventSink)             │
//! │                                                          │
//! │  ───────────── Port Trait Boundary ─────────────         │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────┐      │
//! │  │   StateMonitor · NotificationDispatcher        │      │
//! │  │   seed · debounce · dedup · retention          │      │
//! │  └────────────────────────────────────────────────┘      │
//! │                         │                                │
//! │                    EventStore (SQLite)                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod mqtt;
pub mod store;
pub mod topics;

pub mod adapters;
