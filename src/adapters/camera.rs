//! Command-driven capture adapter.
//!
//! Runs a configured external program (e.g. `raspistill -o {path}`) to
//! produce the capture artifact. The program is started and left to finish
//! on its own — the dispatcher's artifact wait handles readiness, so a slow
//! capture never blocks anything but its own dispatch thread.

use std::path::PathBuf;
use std::process::Command;

use log::debug;

use crate::app::ports::{CameraPort, CaptureError};
use crate::config::DispatchConfig;

/// Capture via an external program with `{path}` substitution.
pub struct CommandCamera {
    command: Vec<String>,
    capture_dir: PathBuf,
}

impl CommandCamera {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            command: config.capture_command.clone(),
            capture_dir: PathBuf::from(&config.capture_dir),
        }
    }

    fn artifact_path(&self, conversation_id: &str) -> PathBuf {
        self.capture_dir.join(format!("door_{conversation_id}.jpg"))
    }
}

impl CameraPort for CommandCamera {
    fn capture(&self, conversation_id: &str) -> Result<PathBuf, CaptureError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or(CaptureError::Unconfigured)?;
        let path = self.artifact_path(conversation_id);
        let path_str = path.to_string_lossy();

        let args: Vec<String> = args
            .iter()
            .map(|a| a.replace("{path}", &path_str))
            .collect();
        debug!("capture: {program} {args:?}");
        Command::new(program)
            .args(&args)
            .spawn()
            .map_err(|e| CaptureError::CommandFailed(format!("{program}: {e}")))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_unconfigured() {
        let camera = CommandCamera::new(&DispatchConfig::default());
        assert_eq!(camera.capture("42").unwrap_err(), CaptureError::Unconfigured);
    }

    #[test]
    fn artifact_path_embeds_conversation_id() {
        let config = DispatchConfig {
            capture_dir: "/tmp/shots".to_string(),
            ..DispatchConfig::default()
        };
        let camera = CommandCamera::new(&config);
        assert_eq!(
            camera.artifact_path("3182910544"),
            PathBuf::from("/tmp/shots/door_3182910544.jpg")
        );
    }

    #[test]
    fn capture_runs_the_configured_program() {
        let dir = tempfile::tempdir().unwrap();
        let config = DispatchConfig {
            capture_dir: dir.path().to_string_lossy().into_owned(),
            capture_command: vec!["touch".to_string(), "{path}".to_string()],
            ..DispatchConfig::default()
        };
        let camera = CommandCamera::new(&config);
        let path = camera.capture("99").unwrap();
        // `touch` runs asynchronously; give it a moment.
        for _ in 0..50 {
            if path.exists() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(path.exists());
    }

    #[test]
    fn missing_program_is_command_failed() {
        let config = DispatchConfig {
            capture_command: vec!["/no/such/program".to_string()],
            ..DispatchConfig::default()
        };
        let camera = CommandCamera::new(&config);
        assert!(matches!(
            camera.capture("1").unwrap_err(),
            CaptureError::CommandFailed(_)
        ));
    }
}
