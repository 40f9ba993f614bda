//! Hands console commands to the backend queue.

use crossbeam_channel::{Sender, TrySendError};

use crate::commands::BackendCommand;

/// Queues `cmd` for the backend worker. On failure `status` is set to a
/// message for the user and `false` is returned.
pub fn dispatch_backend_command(
    cmd_tx: &Sender<BackendCommand>,
    cmd: BackendCommand,
    status: &mut String,
) -> bool {
    let cmd_name = cmd.name();
    match cmd_tx.try_send(cmd) {
        Ok(()) => {
            tracing::debug!(command = cmd_name, "queued console->backend command");
            true
        }
        Err(TrySendError::Full(_)) => {
            *status = "Command queue is full; please retry".to_string();
            false
        }
        Err(TrySendError::Disconnected(_)) => {
            *status = "Backend worker stopped; restart the application".to_string();
            false
        }
    }
}
