//! Command-driven push-delivery adapter.
//!
//! Runs a configured external program per notification, substituting
//! `{text}` or `{file}` into its arguments. Exit status is checked — a
//! failed delivery surfaces as a typed error for the dispatcher to log.

use std::path::Path;
use std::process::Command;

use log::debug;

use crate::app::ports::{NotifierPort, NotifyError};

/// Push delivery via an external program.
pub struct CommandNotifier {
    command: Vec<String>,
}

impl CommandNotifier {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn run(&self, key: &str, value: &str) -> Result<(), NotifyError> {
        let (program, args) = self.command.split_first().ok_or(NotifyError::Unconfigured)?;
        let pattern = format!("{{{key}}}");
        let args: Vec<String> = args.iter().map(|a| a.replace(&pattern, value)).collect();
        debug!("notify: {program} {args:?}");

        let status = Command::new(program)
            .args(&args)
            .status()
            .map_err(|e| NotifyError::CommandFailed(format!("{program}: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(NotifyError::CommandFailed(format!(
                "{program} exited with {status}"
            )))
        }
    }
}

impl NotifierPort for CommandNotifier {
    fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        self.run("text", text)
    }

    fn send_file(&self, path: &Path) -> Result<(), NotifyError> {
        self.run("file", &path.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_unconfigured() {
        let n = CommandNotifier::new(Vec::new());
        assert_eq!(n.send_text("hi").unwrap_err(), NotifyError::Unconfigured);
    }

    #[test]
    fn successful_command_is_ok() {
        let n = CommandNotifier::new(vec!["true".to_string(), "{text}".to_string()]);
        assert!(n.send_text("door open").is_ok());
    }

    #[test]
    fn failing_command_surfaces_exit_status() {
        let n = CommandNotifier::new(vec!["false".to_string()]);
        assert!(matches!(
            n.send_text("x").unwrap_err(),
            NotifyError::CommandFailed(_)
        ));
    }
}
