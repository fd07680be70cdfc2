//! Sysfs GPIO digital-input adapter.
//!
//! Reads the instantaneous level of one input line through the kernel's
//! sysfs interface (`/sys/class/gpio/gpioN/value`). The line is exported on
//! construction if it is not already, and unexported by `cleanup()`.
//!
//! The monitor treats read faults as transient — electrically noisy wiring
//! is expected — so every failure here is a typed [`SensorError`], never a
//! panic.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use log::{debug, warn};

use crate::app::ports::SensorPort;
use crate::error::SensorError;

const SYSFS_ROOT: &str = "/sys/class/gpio";

/// Digital input on a sysfs GPIO line.
pub struct SysfsGpio {
    gpio: u32,
    value_path: PathBuf,
    /// Whether this instance exported the line (and should unexport it).
    exported_here: bool,
    cleaned: bool,
}

impl SysfsGpio {
    /// Export the line (if needed), set it to input, and return the
    /// adapter. Construction failures are fatal to startup.
    pub fn new(gpio: u32) -> Result<Self, SensorError> {
        let base = PathBuf::from(SYSFS_ROOT).join(format!("gpio{gpio}"));
        let mut exported_here = false;

        if !base.exists() {
            write_sysfs(&PathBuf::from(SYSFS_ROOT).join("export"), &gpio.to_string())?;
            exported_here = true;
        }
        write_sysfs(&base.join("direction"), "in")?;
        debug!("gpio{gpio} ready (exported_here={exported_here})");

        Ok(Self {
            gpio,
            value_path: base.join("value"),
            exported_here,
            cleaned: false,
        })
    }

    /// Test/bench constructor: read levels from an arbitrary file.
    pub fn with_value_path(path: impl Into<PathBuf>) -> Self {
        Self {
            gpio: 0,
            value_path: path.into(),
            exported_here: false,
            cleaned: false,
        }
    }
}

impl SensorPort for SysfsGpio {
    fn read(&mut self) -> Result<bool, SensorError> {
        let raw = fs::read_to_string(&self.value_path)
            .map_err(|e| SensorError::ReadFailed(format!("{}: {e}", self.value_path.display())))?;
        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(SensorError::InvalidLevel(other.to_string())),
        }
    }

    fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        if self.exported_here {
            let unexport = PathBuf::from(SYSFS_ROOT).join("unexport");
            if let Err(e) = write_sysfs(&unexport, &self.gpio.to_string()) {
                warn!("gpio{} unexport failed: {e}", self.gpio);
            }
        }
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn write_sysfs(path: &PathBuf, value: &str) -> Result<(), SensorError> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| SensorError::ReadFailed(format!("{}: {e}", path.display())))?;
    file.write_all(value.as_bytes())
        .map_err(|e| SensorError::ReadFailed(format!("{}: {e}", path.display())))?;
    Ok(())
}
