//! System wall-clock adapter.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::app::ports::ClockPort;

/// Wall-clock seconds since epoch.
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now_epoch(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            // A clock before 1970 means the RTC is unset; zero keeps the
            // arithmetic defined and the staleness rule will republish.
            .unwrap_or(0)
    }
}
