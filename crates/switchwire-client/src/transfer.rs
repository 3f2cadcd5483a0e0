//! Seam toward the data-transfer collaborator.
//!
//! The file/still/macro transfer machinery lives outside this crate; the
//! dispatcher only needs to offer it every decoded command before user
//! delivery. A claimed command is consumed silently.

use switchwire_protocol::ReceivedCommand;

/// Collaborator that may claim decoded commands before they reach the user.
pub trait DataTransferHandler: Send {
    /// Offers a command. Returning `true` consumes it.
    fn handle(&mut self, command: &dyn ReceivedCommand) -> bool;

    /// Called on every handshake completion; any in-progress transfer state
    /// belongs to the previous session and must be discarded.
    fn reset(&mut self) {}

    /// Called once at client teardown.
    fn dispose(&mut self) {}
}

/// Transfer handler that claims nothing; the default collaborator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDataTransfer;

impl DataTransferHandler for NullDataTransfer {
    fn handle(&mut self, _command: &dyn ReceivedCommand) -> bool {
        false
    }
}
