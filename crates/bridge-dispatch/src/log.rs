//! # Command Log
//!
//! In-process record of command lifecycle state. Backs the polling surface:
//! devices that pull (HTTP) fetch their pending commands from here, oldest
//! first, and report acks back against it.

use bridge_types::{Ack, Command, CommandState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// A command with its current lifecycle state.
#[derive(Debug, Clone)]
pub struct LoggedCommand {
    pub command: Command,
    pub state: CommandState,
    pub last_error: Option<String>,
    pub acked_at: Option<DateTime<Utc>>,
}

/// Keyed command state. Process-local, like the other dispatch-side caches.
#[derive(Default)]
pub struct CommandLog {
    commands: DashMap<Uuid, LoggedCommand>,
}

impl CommandLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly accepted command as pending.
    pub fn record_pending(&self, command: &Command) {
        self.commands.insert(
            command.command_id,
            LoggedCommand {
                command: command.clone(),
                state: CommandState::Pending,
                last_error: None,
                acked_at: None,
            },
        );
    }

    /// Mark a command as handed to its transport.
    pub fn mark_sent(&self, command_id: Uuid) {
        if let Some(mut logged) = self.commands.get_mut(&command_id) {
            logged.state = CommandState::Sent;
        }
    }

    /// Record the device's acknowledgement.
    ///
    /// A negative ack is a device-side failure, not a delivery failure.
    pub fn mark_acknowledged(&self, ack: &Ack) {
        if let Some(mut logged) = self.commands.get_mut(&ack.command_id) {
            logged.state = if ack.ok {
                CommandState::Acknowledged
            } else {
                CommandState::Failed
            };
            logged.acked_at = Some(ack.ts);
            logged.last_error = ack.message.clone().filter(|_| !ack.ok);
            debug!(command_id = %ack.command_id, ok = ack.ok, "command acknowledged");
        }
    }

    /// Record a delivery failure.
    pub fn mark_failed(&self, command_id: Uuid, error: &str) {
        if let Some(mut logged) = self.commands.get_mut(&command_id) {
            logged.state = CommandState::Failed;
            logged.last_error = Some(error.to_owned());
        }
    }

    /// Current state of a command.
    #[must_use]
    pub fn state(&self, command_id: Uuid) -> Option<CommandState> {
        self.commands.get(&command_id).map(|c| c.state)
    }

    /// Full record of a command.
    #[must_use]
    pub fn get(&self, command_id: Uuid) -> Option<LoggedCommand> {
        self.commands.get(&command_id).map(|c| c.value().clone())
    }

    /// Pending commands for a polling device, creation time ascending.
    #[must_use]
    pub fn pending_for(&self, device_id: &str) -> Vec<Command> {
        let mut pending: Vec<Command> = self
            .commands
            .iter()
            .filter(|entry| {
                entry.state == CommandState::Pending && entry.command.device_id == device_id
            })
            .map(|entry| entry.command.clone())
            .collect();
        pending.sort_by_key(|c| c.issued_at);
        pending
    }

    /// Number of tracked commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_pending_ordered_by_creation_time() {
        let log = CommandLog::new();

        let mut newer = Command::new("dev-1", "set_pwm");
        let mut older = Command::new("dev-1", "relay_control");
        older.issued_at = Utc::now() - Duration::seconds(30);
        newer.issued_at = Utc::now();

        log.record_pending(&newer);
        log.record_pending(&older);
        log.record_pending(&Command::new("dev-2", "relay_control"));

        let pending = log.pending_for("dev-1");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].command_type, "relay_control");
        assert_eq!(pending[1].command_type, "set_pwm");
    }

    #[test]
    fn test_sent_commands_not_returned_to_pollers() {
        let log = CommandLog::new();
        let cmd = Command::new("dev-1", "relay_control");
        log.record_pending(&cmd);
        log.mark_sent(cmd.command_id);
        assert!(log.pending_for("dev-1").is_empty());
    }

    #[test]
    fn test_ack_transitions() {
        let log = CommandLog::new();
        let cmd = Command::new("dev-1", "relay_control");
        log.record_pending(&cmd);
        log.mark_sent(cmd.command_id);

        log.mark_acknowledged(&Ack::success("dev-1", cmd.command_id));
        assert_eq!(log.state(cmd.command_id), Some(CommandState::Acknowledged));
    }

    #[test]
    fn test_negative_ack_records_failure() {
        let log = CommandLog::new();
        let cmd = Command::new("dev-1", "relay_control");
        log.record_pending(&cmd);

        log.mark_acknowledged(&Ack::rejected(
            "dev-1",
            cmd.command_id,
            "unsupported",
            "unknown channel",
        ));
        let logged = log.get(cmd.command_id).unwrap();
        assert_eq!(logged.state, CommandState::Failed);
        assert_eq!(logged.last_error.as_deref(), Some("unknown channel"));
    }

    #[test]
    fn test_mark_failed() {
        let log = CommandLog::new();
        let cmd = Command::new("dev-1", "relay_control");
        log.record_pending(&cmd);
        log.mark_failed(cmd.command_id, "timed out");
        assert_eq!(log.state(cmd.command_id), Some(CommandState::Failed));
    }
}
