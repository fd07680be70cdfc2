//! Doorwatch daemon entry point.
//!
//! Wiring order: config → logging → event store (fatal on failure) →
//! adapters → control-topic subscriber → monitor loop. The process blocks
//! in the monitor loop until interrupted, then cleans up every component;
//! cleanup tolerates already-stopped components.

#![deny(unused_must_use)]

use std::env;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use doorwatch::adapters::camera::CommandCamera;
use doorwatch::adapters::clock::SystemClock;
use doorwatch::adapters::gpio::SysfsGpio;
use doorwatch::adapters::log_sink::LogEventSink;
use doorwatch::adapters::mqtt_pub::SinglePublisher;
use doorwatch::adapters::notify::CommandNotifier;
use doorwatch::app::commands::MonitorCommand;
use doorwatch::app::dispatch::NotificationDispatcher;
use doorwatch::app::monitor::StateMonitor;
use doorwatch::app::ports::SensorPort;
use doorwatch::config::Config;
use doorwatch::mqtt::{MqttSettings, Subscriber};
use doorwatch::store::sqlite::SqliteStore;
use doorwatch::topics::TopicSet;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("doorwatch v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Configuration ──────────────────────────────────────
    let config = match env::args().nth(1).or_else(|| env::var("DOORWATCH_CONFIG").ok()) {
        Some(path) => Config::load(&path).with_context(|| format!("loading config {path}"))?,
        None => {
            warn!("no config path given, running with defaults");
            Config::default()
        }
    };

    let settings = MqttSettings::from_config(&config.broker)?;
    let topics = TopicSet::from_config(&config.topics);

    // ── 2. Event store (construction failures are fatal) ──────
    let store = SqliteStore::open(&config.monitor.db_path, &config.monitor.table)
        .with_context(|| format!("opening event store {}", config.monitor.db_path))?;

    let mut monitor = StateMonitor::new(
        store,
        topics.clone(),
        config.monitor.clone(),
        config.sensor.open_on_high,
        config.broker.retain,
    );
    monitor.ensure_schema().context("event table schema")?;

    // ── 3. Shutdown signal ────────────────────────────────────
    let running = monitor.running_handle();
    ctrlc::set_handler(move || {
        info!("interrupt received, stopping after current tick");
        running.store(false, Ordering::SeqCst);
    })
    .context("installing signal handler")?;

    // ── 4. Control-topic subscriber ───────────────────────────
    let subscribe_names: Vec<String> = topics.subscribe_topics().map(|t| t.name.clone()).collect();
    let mut subscriber = if subscribe_names.is_empty() {
        None
    } else {
        let command_tx = monitor.command_sender();
        let control_topics = topics.clone();
        let sub = Subscriber::start(&settings, subscribe_names, move |topic, raw| {
            let Some(expected) = control_topics.get(topic) else {
                return;
            };
            if !expected.matches_incoming(raw) {
                warn!("malformed control payload on '{topic}', dropping");
                return;
            }
            let Some(verb) = expected.extract_incoming(raw, "command") else {
                return;
            };
            match MonitorCommand::parse(&verb) {
                Some(cmd) => {
                    let _ = command_tx.send(cmd);
                }
                None => warn!("unknown control verb {verb:?} on '{topic}'"),
            }
        })?;
        Some(sub)
    };

    // ── 5. Adapters + dispatcher ──────────────────────────────
    let camera = Arc::new(CommandCamera::new(&config.dispatch));
    let notifier = Arc::new(CommandNotifier::new(config.dispatch.notify_command.clone()));
    let dispatcher = NotificationDispatcher::new(
        camera,
        notifier,
        config.dispatch.clone(),
        monitor.report_sender(),
    );

    let mut sensor = SysfsGpio::new(config.sensor.gpio).context("gpio input")?;
    let publisher = SinglePublisher::new(settings);
    let mut sink = LogEventSink::new();

    // ── 6. Monitor loop (blocks until interrupted) ────────────
    monitor.run(&mut sensor, &publisher, &dispatcher, &SystemClock, &mut sink);

    // ── 7. Cleanup ────────────────────────────────────────────
    sensor.cleanup();
    if let Some(sub) = subscriber.as_mut() {
        sub.shutdown();
    }
    info!("doorwatch shut down cleanly");
    Ok(())
}
