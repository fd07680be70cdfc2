//! Inbound commands to the state monitor.
//!
//! These represent actions requested by the outside world (control topics,
//! signal handlers) that the monitor drains from its command channel once
//! per tick. Delivery latency is therefore bounded by one poll period.

/// Commands that external adapters can send into the monitor core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    /// Publish the current state now, regardless of staleness. Used when a
    /// consumer suspects it missed the last message.
    Reaffirm,

    /// Clear the running flag; the loop exits on its next tick.
    Stop,
}

impl MonitorCommand {
    /// Parse a validated control payload. Unknown verbs are `None` — the
    /// caller logs and drops them rather than acting on garbage.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "reaffirm" | "republish" => Some(Self::Reaffirm),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_verbs_parse() {
        assert_eq!(MonitorCommand::parse("reaffirm"), Some(MonitorCommand::Reaffirm));
        assert_eq!(MonitorCommand::parse("republish"), Some(MonitorCommand::Reaffirm));
        assert_eq!(MonitorCommand::parse(" stop\n"), Some(MonitorCommand::Stop));
    }

    #[test]
    fn unknown_verbs_are_dropped() {
        assert_eq!(MonitorCommand::parse("explode"), None);
        assert_eq!(MonitorCommand::parse(""), None);
    }
}
