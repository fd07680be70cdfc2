//! Application core — the debounce/dedup decision logic, zero real I/O.
//!
//! The [`monitor::StateMonitor`] is the single writer of the event store and
//! the only component that decides when a transition is published. All
//! interaction with the outside world (sensor pin, broker, camera, push
//! delivery, wall clock) happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable with mock adapters.

pub mod commands;
pub mod dispatch;
pub mod events;
pub mod monitor;
pub mod ports;
