//! State monitor — the debounced polling state machine.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────┐ ──▶ PublishPort (broker)
//!                 │       StateMonitor        │ ──▶ DispatchPort (side effects)
//!   ClockPort ──▶ │  seed · debounce · dedup  │ ──▶ EventSink (log)
//!                 └──────────────────────────┘
//!                        │ single writer
//!                        ▼
//!                    EventStore
//! ```
//!
//! Phases: `Uninitialized` → `Steady(state)` → `Stopped`. Evaluated once per
//! poll tick:
//!
//! 1. Read the digital input.
//! 2. `Uninitialized`: seed `Steady(current)` without publishing — the first
//!    read never produces a spurious event.
//! 3. Unchanged state: re-publish only if the latest stored record is stale,
//!    guarding against a missed or duplicate message being the last one a
//!    consumer saw.
//! 4. Changed state: record + publish + dispatch.
//!
//! The read-latest / decide / insert sequence is not transactional. That is
//! fine under the stated ownership rule: exactly one monitor instance owns
//! the store's write path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::commands::MonitorCommand;
use super::events::MonitorEvent;
use super::ports::{ClockPort, DispatchPort, EventSink, PublishPort, SensorPort};
use crate::config::MonitorConfig;
use crate::error::StoreError;
use crate::store::{event_columns, DeliveryFlag, EventRecord, EventStore};
use crate::topics::TopicSet;

// ---------------------------------------------------------------------------
// Door state
// ---------------------------------------------------------------------------

/// The two-valued sensor domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Open,
    Closed,
}

impl DoorState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
        }
    }

    /// Map a raw pin level onto the domain. `open_on_high` captures the
    /// wiring polarity (normally-closed reed switches read high when the
    /// magnet leaves).
    pub fn from_level(level: bool, open_on_high: bool) -> Self {
        if level == open_on_high {
            Self::Open
        } else {
            Self::Closed
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Open" => Some(Self::Open),
            "Closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DoorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No read has succeeded yet; the first one seeds the steady state.
    Uninitialized,
    Steady(DoorState),
    Stopped,
}

// ---------------------------------------------------------------------------
// Delivery reports
// ---------------------------------------------------------------------------

/// Sent back by the dispatcher when a side effect completes, so the monitor
/// (the sole store writer) can flip the matching delivery flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub timestamp: i64,
    pub flag: DeliveryFlag,
}

// ---------------------------------------------------------------------------
// State monitor
// ---------------------------------------------------------------------------

/// Polls the digital input, runs the debounce/dedup decision against the
/// event store, and publishes qualifying transitions.
pub struct StateMonitor<S: EventStore> {
    store: S,
    topics: TopicSet,
    config: MonitorConfig,
    open_on_high: bool,
    retain: bool,
    phase: Phase,
    running: Arc<AtomicBool>,
    command_tx: Sender<MonitorCommand>,
    command_rx: Receiver<MonitorCommand>,
    report_tx: Sender<DeliveryReport>,
    report_rx: Receiver<DeliveryReport>,
}

impl<S: EventStore> StateMonitor<S> {
    pub fn new(
        store: S,
        topics: TopicSet,
        config: MonitorConfig,
        open_on_high: bool,
        retain: bool,
    ) -> Self {
        let (command_tx, command_rx) = channel();
        let (report_tx, report_rx) = channel();
        Self {
            store,
            topics,
            config,
            open_on_high,
            retain,
            phase: Phase::Uninitialized,
            running: Arc::new(AtomicBool::new(true)),
            command_tx,
            command_rx,
            report_tx,
            report_rx,
        }
    }

    /// Create the event table if needed. Fatal on schema mismatch — called
    /// at construction time, before the loop starts.
    pub fn ensure_schema(&mut self) -> Result<(), StoreError> {
        let table = self.config.table.clone();
        self.store.ensure_table(&table, &event_columns())
    }

    /// Cooperative stop flag, shared with signal handlers.
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Channel for inbound control commands (drained once per tick).
    pub fn command_sender(&self) -> Sender<MonitorCommand> {
        self.command_tx.clone()
    }

    /// Channel the dispatcher uses to report completed side effects.
    pub fn report_sender(&self) -> Sender<DeliveryReport> {
        self.report_tx.clone()
    }

    /// Clear the running flag; the loop observes it on its next tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Read access to the store for assertions and report pages.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Poll loop ─────────────────────────────────────────────

    /// Run ticks at the configured period until the running flag clears.
    /// Stop latency is bounded by roughly one poll period.
    pub fn run(
        &mut self,
        sensor: &mut impl SensorPort,
        publisher: &impl PublishPort,
        dispatcher: &impl DispatchPort,
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) {
        let period = Duration::from_millis(self.config.poll_interval_ms);
        info!(
            "monitor loop starting: period={:?} staleness={}s keep={}",
            period, self.config.staleness_threshold_secs, self.config.retention_keep
        );
        while self.running.load(Ordering::SeqCst) {
            self.tick(sensor, publisher, dispatcher, clock, sink);
            thread::sleep(period);
        }
        if self.phase != Phase::Stopped {
            self.phase = Phase::Stopped;
            sink.emit(&MonitorEvent::Stopped);
        }
        info!("monitor loop stopped");
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full decision cycle: commands → reports → read → decide.
    pub fn tick(
        &mut self,
        sensor: &mut impl SensorPort,
        publisher: &impl PublishPort,
        dispatcher: &impl DispatchPort,
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) {
        let force_reaffirm = self.drain_commands(sink);
        self.drain_reports(sink);

        if self.phase == Phase::Stopped {
            return;
        }

        // 1. Read the digital input.
        let level = match sensor.read() {
            Ok(level) => level,
            Err(e) => {
                warn!("sensor read failed, retrying next tick: {e}");
                sink.emit(&MonitorEvent::SensorFault(e));
                return;
            }
        };
        let current = DoorState::from_level(level, self.open_on_high);

        match self.phase {
            Phase::Uninitialized => {
                // 2. First read seeds state; no spurious initial event.
                self.phase = Phase::Steady(current);
                info!("seeded initial state: {current}");
                sink.emit(&MonitorEvent::Seeded(current));
            }
            Phase::Steady(prev) if current != prev => {
                // 4. Confirmed transition.
                self.phase = Phase::Steady(current);
                if let Some(conversation_id) =
                    self.publish_transition(current, publisher, dispatcher, clock, sink)
                {
                    sink.emit(&MonitorEvent::Transition {
                        from: prev,
                        to: current,
                        conversation_id,
                    });
                }
            }
            Phase::Steady(_) => {
                // 3. Unchanged; reaffirm only when the last record is stale
                //    (or a consumer explicitly asked).
                let stale = match self.should_publish(current, clock.now_epoch()) {
                    Ok(stale) => stale,
                    Err(e) => {
                        warn!("staleness query failed: {e}");
                        false
                    }
                };
                if force_reaffirm || stale {
                    if let Some(conversation_id) =
                        self.publish_transition(current, publisher, dispatcher, clock, sink)
                    {
                        sink.emit(&MonitorEvent::Reaffirmed {
                            state: current,
                            conversation_id,
                        });
                    }
                }
            }
            Phase::Stopped => {}
        }
    }

    /// Publication decision for an unchanged state: publish when the store
    /// is empty, disagrees with the observed state, or has gone stale.
    fn should_publish(&self, current: DoorState, now: i64) -> Result<bool, StoreError> {
        let Some(latest) = self.store.get_latest()? else {
            return Ok(true);
        };
        if latest.state != current.as_str() {
            return Ok(true);
        }
        Ok(now - latest.timestamp > self.config.staleness_threshold_secs)
    }

    /// Record and publish one transition. Returns the conversation id when
    /// the record was committed; store/publish faults are logged and do not
    /// stop the loop.
    fn publish_transition(
        &mut self,
        current: DoorState,
        publisher: &impl PublishPort,
        dispatcher: &impl DispatchPort,
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) -> Option<String> {
        let conversation_id = rand::random::<u32>().to_string();

        // Keep the primary key strictly increasing even when two
        // transitions land in the same epoch second.
        let mut timestamp = clock.now_epoch();
        match self.store.get_latest() {
            Ok(Some(latest)) if latest.timestamp >= timestamp => {
                timestamp = latest.timestamp + 1;
            }
            Ok(_) => {}
            Err(e) => warn!("latest-record query failed before insert: {e}"),
        }

        let record = EventRecord::new(timestamp, current.as_str(), conversation_id.clone());
        if let Err(e) = self.store.insert(&record) {
            error!("event insert failed (key={timestamp}, id={conversation_id}): {e}");
            return None;
        }
        if let Err(e) = self.store.delete_all_except_last_n(self.config.retention_keep) {
            warn!("retention prune failed: {e}");
        }

        // Publish every configured topic; a failed topic is logged and the
        // staleness rule will re-surface the state later.
        let args = [
            ("state", current.as_str()),
            ("convo_id", conversation_id.as_str()),
        ];
        let names: Vec<String> = self.topics.publish_topics().map(|t| t.name.clone()).collect();
        for name in names {
            let payload = match self.topics.payload(&name, &args) {
                Ok(payload) => payload,
                Err(e) => {
                    // Misconfigured template: never send a partial payload.
                    error!("payload render failed for '{name}': {e}");
                    sink.emit(&MonitorEvent::PublishFailed {
                        topic: name.clone(),
                        conversation_id: conversation_id.clone(),
                    });
                    continue;
                }
            };
            if let Err(e) = publisher.publish(&name, &payload, self.retain) {
                warn!("publish '{name}' failed (id={conversation_id}): {e}");
                sink.emit(&MonitorEvent::PublishFailed {
                    topic: name.clone(),
                    conversation_id: conversation_id.clone(),
                });
            } else {
                debug!("published '{name}' (id={conversation_id})");
            }
        }

        // Side effects run on their own unit; steps above have committed.
        dispatcher.dispatch(current, &conversation_id, timestamp);

        Some(conversation_id)
    }

    // ── Channels ──────────────────────────────────────────────

    /// Returns whether a reaffirm was requested this tick.
    fn drain_commands(&mut self, sink: &mut impl EventSink) -> bool {
        let mut reaffirm = false;
        while let Ok(cmd) = self.command_rx.try_recv() {
            match cmd {
                MonitorCommand::Reaffirm => {
                    info!("reaffirm requested");
                    reaffirm = true;
                }
                MonitorCommand::Stop => {
                    info!("stop requested via control channel");
                    self.running.store(false, Ordering::SeqCst);
                    self.phase = Phase::Stopped;
                    sink.emit(&MonitorEvent::Stopped);
                }
            }
        }
        reaffirm
    }

    /// Flip delivery flags for completed side effects. A pruned record is a
    /// non-fatal miss.
    fn drain_reports(&mut self, sink: &mut impl EventSink) {
        while let Ok(report) = self.report_rx.try_recv() {
            match self
                .store
                .update_field(report.timestamp, report.flag, true)
            {
                Ok(()) => sink.emit(&MonitorEvent::FlagUpdated {
                    timestamp: report.timestamp,
                    flag: report.flag,
                }),
                Err(StoreError::NotFound(key)) => {
                    debug!("delivery flag for pruned record {key}, ignoring");
                }
                Err(e) => warn!("delivery flag update failed: {e}"),
            }
        }
    }
}
