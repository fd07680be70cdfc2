//! Notification dispatcher — per-transition side effects.
//!
//! Given `(state, conversation_id, timestamp)`:
//!
//! - transition to open: trigger a capture, wait for the artifact file with
//!   a bounded timeout (plus a short settle delay when the file already
//!   exists, protecting against reading a partially written prior capture),
//!   then deliver it;
//! - transition to closed: deliver a text notification directly.
//!
//! Each invocation runs on its own short-lived thread — transitions are
//! rare, bounded by sensor physics, so no pool. Every failure is caught at
//! this boundary and logged; nothing propagates into the monitor loop, and
//! an in-flight notification runs to completion (or its own timeout) even
//! after the monitor is asked to stop.
//!
//! Completed side effects are reported back to the monitor over a channel
//! so the store's single writer can flip the `captured`/`notified` flags.

use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use super::monitor::{DeliveryReport, DoorState};
use super::ports::{CameraPort, DispatchPort, NotifierPort};
use crate::config::DispatchConfig;
use crate::store::DeliveryFlag;

/// How often the artifact wait re-checks the filesystem.
const ARTIFACT_POLL: Duration = Duration::from_millis(250);

/// Spawns one worker thread per confirmed transition.
#[derive(Clone)]
pub struct NotificationDispatcher {
    camera: Arc<dyn CameraPort>,
    notifier: Arc<dyn NotifierPort>,
    config: DispatchConfig,
    reports: Sender<DeliveryReport>,
}

impl NotificationDispatcher {
    pub fn new(
        camera: Arc<dyn CameraPort>,
        notifier: Arc<dyn NotifierPort>,
        config: DispatchConfig,
        reports: Sender<DeliveryReport>,
    ) -> Self {
        Self {
            camera,
            notifier,
            config,
            reports,
        }
    }

    fn report(&self, timestamp: i64, flag: DeliveryFlag) {
        // The monitor may already be gone during shutdown; that only means
        // the flag stays false, which is accurate.
        let _ = self.reports.send(DeliveryReport { timestamp, flag });
    }

    /// Worker body. Runs on the per-transition thread.
    fn run(&self, state: DoorState, conversation_id: &str, timestamp: i64) {
        match state {
            DoorState::Open => self.deliver_capture(conversation_id, timestamp),
            DoorState::Closed => self.deliver_text(state, conversation_id, timestamp),
        }
    }

    fn deliver_capture(&self, conversation_id: &str, timestamp: i64) {
        let artifact = match self.camera.capture(conversation_id) {
            Ok(path) => path,
            Err(e) => {
                warn!("capture trigger failed (id={conversation_id}): {e}");
                return;
            }
        };

        let timeout = Duration::from_secs(self.config.capture_timeout_secs);
        let settle = Duration::from_millis(self.config.settle_ms);
        if !wait_for_artifact(&artifact, timeout, settle) {
            warn!(
                "capture artifact {} never appeared within {:?} (id={conversation_id})",
                artifact.display(),
                timeout
            );
            return;
        }
        self.report(timestamp, DeliveryFlag::Captured);

        match self.notifier.send_file(&artifact) {
            Ok(()) => {
                info!("image notification sent (id={conversation_id})");
                self.report(timestamp, DeliveryFlag::Notified);
            }
            Err(e) => warn!("image notification failed (id={conversation_id}): {e}"),
        }
    }

    fn deliver_text(&self, state: DoorState, conversation_id: &str, timestamp: i64) {
        let text = format!("Door {state} (event {conversation_id})");
        match self.notifier.send_text(&text) {
            Ok(()) => {
                info!("text notification sent (id={conversation_id})");
                self.report(timestamp, DeliveryFlag::Notified);
            }
            Err(e) => warn!("text notification failed (id={conversation_id}): {e}"),
        }
    }
}

impl DispatchPort for NotificationDispatcher {
    fn dispatch(&self, state: DoorState, conversation_id: &str, timestamp: i64) {
        let worker = self.clone();
        let conversation_id = conversation_id.to_string();
        let spawned = thread::Builder::new()
            .name(format!("dispatch-{conversation_id}"))
            .spawn(move || worker.run(state, &conversation_id, timestamp));
        if let Err(e) = spawned {
            warn!("dispatch thread spawn failed: {e}");
        }
    }
}

/// Block until `path` exists, up to `timeout`. A file that already exists
/// when the wait starts gets `settle` extra time in case a previous writer
/// is still flushing it. Returns whether the artifact is ready.
fn wait_for_artifact(path: &Path, timeout: Duration, settle: Duration) -> bool {
    if path.exists() {
        thread::sleep(settle);
        return true;
    }
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        thread::sleep(ARTIFACT_POLL.min(timeout));
        if path.exists() {
            return true;
        }
    }
    path.exists()
}
