//! Property tests for the core invariants: debounce/dedup publish counts,
//! keep-last-N retention, key monotonicity, and payload completeness.

use std::cell::Cell;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use proptest::prelude::*;

use doorwatch::app::events::MonitorEvent;
use doorwatch::app::monitor::{DoorState, StateMonitor};
use doorwatch::app::ports::{ClockPort, DispatchPort, EventSink, PublishPort, SensorPort};
use doorwatch::config::{MonitorConfig, TopicsConfig};
use doorwatch::error::{MessagingError, PayloadError, SensorError};
use doorwatch::store::sqlite::SqliteStore;
use doorwatch::store::{event_columns, EventRecord, EventStore};
use doorwatch::topics::{Payload, TopicSet};

// ── Test doubles ──────────────────────────────────────────────

struct ScriptSensor {
    levels: Vec<bool>,
    pos: usize,
}

impl SensorPort for ScriptSensor {
    fn read(&mut self) -> Result<bool, SensorError> {
        let level = self.levels[self.pos.min(self.levels.len() - 1)];
        self.pos += 1;
        Ok(level)
    }
}

#[derive(Default)]
struct CountingPublisher {
    count: AtomicUsize,
}

impl PublishPort for CountingPublisher {
    fn publish(&self, _topic: &str, _payload: &Payload, _retain: bool) -> Result<(), MessagingError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct NullDispatcher;

impl DispatchPort for NullDispatcher {
    fn dispatch(&self, _state: DoorState, _conversation_id: &str, _timestamp: i64) {}
}

struct ManualClock(Cell<i64>);

impl ClockPort for ManualClock {
    fn now_epoch(&self) -> i64 {
        self.0.get()
    }
}

struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &MonitorEvent) {}
}

// ── Fixtures ──────────────────────────────────────────────────

fn topics() -> TopicSet {
    let config: TopicsConfig = serde_json::from_str(
        r#"{ "publish": { "door/state": { "state": "{state}", "id": "{convo_id}" } } }"#,
    )
    .unwrap();
    TopicSet::from_config(&config)
}

fn monitor(retention_keep: usize) -> StateMonitor<SqliteStore> {
    let config = MonitorConfig {
        retention_keep,
        ..MonitorConfig::default()
    };
    let store = SqliteStore::in_memory(&config.table).unwrap();
    let mut m = StateMonitor::new(store, topics(), config, true, true);
    m.ensure_schema().unwrap();
    m
}

fn fresh_table(name: &str) -> SqliteStore {
    let mut store = SqliteStore::in_memory(name).unwrap();
    store.ensure_table(name, &event_columns()).unwrap();
    store
}

/// Publish count the debounce rules demand for a level script: the first
/// tick only seeds, the second always publishes into an empty store, and
/// from then on only level changes publish.
fn expected_publishes(levels: &[bool]) -> usize {
    if levels.len() < 2 {
        return 0;
    }
    1 + levels
        .windows(2)
        .skip(1)
        .filter(|pair| pair[0] != pair[1])
        .count()
}

// ── Debounce / dedup ─────────────────────────────────────────

proptest! {
    /// For any level script short enough that no record goes stale, the
    /// number of publishes is fully determined by the change structure:
    /// duplicates never publish, changes always do.
    #[test]
    fn publish_count_matches_change_structure(
        levels in proptest::collection::vec(any::<bool>(), 0..=12),
    ) {
        let mut m = monitor(2);
        let mut sensor = ScriptSensor { levels: levels.clone(), pos: 0 };
        let publisher = CountingPublisher::default();
        let clock = ManualClock(Cell::new(1_700_000_000));
        let mut sink = NullSink;

        for _ in 0..levels.len() {
            m.tick(&mut sensor, &publisher, &NullDispatcher, &clock, &mut sink);
            // One second per tick keeps every record well inside the
            // staleness window for scripts this short.
            clock.0.set(clock.0.get() + 1);
        }

        prop_assert_eq!(
            publisher.count.load(Ordering::SeqCst),
            expected_publishes(&levels),
            "levels: {:?}",
            levels
        );
    }

    /// Stored primary keys are strictly increasing even when the clock
    /// stalls or jumps backwards between transitions.
    #[test]
    fn stored_keys_strictly_increase_under_clock_skew(
        deltas in proptest::collection::vec(-5i64..=5i64, 1..=8),
    ) {
        let mut m = monitor(64);
        // Alternate levels so every tick after the seed is a transition.
        let levels: Vec<bool> = (0..=deltas.len()).map(|i| i % 2 == 0).collect();
        let mut sensor = ScriptSensor { levels, pos: 0 };
        let publisher = CountingPublisher::default();
        let clock = ManualClock(Cell::new(1_700_000_000));
        let mut sink = NullSink;

        m.tick(&mut sensor, &publisher, &NullDispatcher, &clock, &mut sink); // seed
        for delta in &deltas {
            clock.0.set(clock.0.get() + delta);
            m.tick(&mut sensor, &publisher, &NullDispatcher, &clock, &mut sink);
        }

        let rows = m.store().get_last_n(deltas.len() + 1).unwrap();
        prop_assert_eq!(rows.len(), deltas.len());
        for pair in rows.windows(2) {
            prop_assert!(
                pair[0].timestamp > pair[1].timestamp,
                "keys must strictly decrease in most-recent-first order"
            );
        }
    }
}

// ── Retention ────────────────────────────────────────────────

proptest! {
    /// After pruning to keep-last-N, exactly the N largest keys survive,
    /// in most-recent-first order.
    #[test]
    fn retention_keeps_exactly_the_newest_n(
        keys in proptest::collection::btree_set(0i64..=10_000, 0..=30),
        keep in 1usize..=5,
    ) {
        let mut store = fresh_table("door_events");
        let records: Vec<EventRecord> = keys
            .iter()
            .map(|&k| EventRecord::new(k, "Open", k.to_string()))
            .collect();
        store.insert_many(&records).unwrap();

        let deleted = store.delete_all_except_last_n(keep).unwrap();
        prop_assert_eq!(deleted, keys.len().saturating_sub(keep));

        let survivors = store.get_last_n(keys.len() + 1).unwrap();
        let expected: Vec<i64> = keys.iter().rev().take(keep).copied().collect();
        let got: Vec<i64> = survivors.iter().map(|r| r.timestamp).collect();
        prop_assert_eq!(got, expected);
    }
}

// ── Payload completeness ─────────────────────────────────────

proptest! {
    /// A template payload either renders with every placeholder filled or
    /// fails naming a missing key; a partial payload is unrepresentable.
    #[test]
    fn payload_is_complete_or_fails_fast(
        supply_state in any::<bool>(),
        supply_id in any::<bool>(),
        state in "[A-Za-z]{1,10}",
        id in "[0-9]{1,10}",
    ) {
        let set = topics();
        let mut args: Vec<(&str, &str)> = Vec::new();
        if supply_state {
            args.push(("state", state.as_str()));
        }
        if supply_id {
            args.push(("convo_id", id.as_str()));
        }

        match set.payload("door/state", &args) {
            Ok(Payload::Json(v)) => {
                prop_assert!(supply_state && supply_id);
                prop_assert_eq!(v["state"].as_str(), Some(state.as_str()));
                prop_assert_eq!(v["id"].as_str(), Some(id.as_str()));
            }
            Ok(Payload::Text(_)) => prop_assert!(false, "two-field template must render JSON"),
            Err(PayloadError::MissingKey(key)) => {
                prop_assert!(!supply_state || !supply_id);
                prop_assert!(key == "state" || key == "convo_id");
            }
            Err(e) => prop_assert!(false, "unexpected error: {e}"),
        }
    }
}
