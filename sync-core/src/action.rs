//! Inputs to the reducer.

use cmdsync_types::{Command, CommandData, Cursor, Doc, LocationId};
use serde::Serialize;

use crate::NextAction;

/// Everything that can happen to a client.
///
/// Six protocol actions walk the PUSH/PULL cycle; three control actions
/// (`ConnectionChanged`, `Interrupted`, `Command`) may arrive at any time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    /// The oldest `limit` commands were taken and sent.
    SentCommandBatch {
        /// Maximum batch size.
        limit: usize,
    },
    /// The server acknowledged the outstanding batch.
    CommandsAcked,
    /// The acknowledged batch was removed from the queue.
    DeletedCommands,
    /// A pull request was sent.
    SentPull,
    /// The server answered the pull request.
    #[serde(rename_all = "camelCase")]
    PullReceived {
        /// Partition of the page.
        location_id: LocationId,
        /// Changed records.
        records: Vec<Doc>,
        /// Cursor for the next page.
        next_cursor: Option<Cursor>,
    },
    /// The received page was merged.
    UpsertedBatch,
    /// Transport connectivity flipped (or was re-reported).
    ConnectionChanged {
        /// New connectivity.
        connected: bool,
    },
    /// Forced reset from the durable snapshot.
    Interrupted,
    /// A local mutation was queued.
    Command {
        /// The stamped command.
        command: Command,
    },
}

impl Action {
    /// Queue a command, assigning its id and timestamp now if absent.
    pub fn command(data: CommandData) -> Self {
        Self::Command {
            command: data.into_command(),
        }
    }

    /// The protocol transition this action performs, if it is one.
    pub fn protocol_kind(&self) -> Option<NextAction> {
        match self {
            Self::SentCommandBatch { .. } => Some(NextAction::SentCommandBatch),
            Self::CommandsAcked => Some(NextAction::CommandsAcked),
            Self::DeletedCommands => Some(NextAction::DeletedCommands),
            Self::SentPull => Some(NextAction::SentPull),
            Self::PullReceived { .. } => Some(NextAction::PullReceived),
            Self::UpsertedBatch => Some(NextAction::UpsertedBatch),
            Self::ConnectionChanged { .. } | Self::Interrupted | Self::Command { .. } => None,
        }
    }

    /// Action type name, for logs.
    pub fn name(&self) -> &'static str {
        match self.protocol_kind() {
            Some(kind) => kind.as_str(),
            None => match self {
                Self::ConnectionChanged { .. } => "connectionChanged",
                Self::Interrupted => "interrupted",
                _ => "command",
            },
        }
    }
}
