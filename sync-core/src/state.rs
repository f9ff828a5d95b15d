//! Protocol state model for cmdsync.
//!
//! A client is always in exactly one [`Phase`]. Each phase carries only the
//! data that exists at that point of the cycle; the shared fields (queue,
//! cursor, records, counters) live on [`ClientState`].
//!
//! The state is only ever changed by [`crate::reduce`]. Everything here is
//! read-only from the outside.

use cmdsync_types::{Command, Cursor, LocationId, PersistedSnapshot};
use serde::Serialize;
use std::fmt;

use crate::{Action, RecordMap};

/// Which half of the cycle the client is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Topic {
    /// Uploading queued commands.
    #[serde(rename = "PUSH")]
    Push,
    /// Downloading changed records.
    #[serde(rename = "PULL")]
    Pull,
    /// Resting between cycles.
    #[serde(rename = "IDLE")]
    Idle,
}

impl Topic {
    /// Wire-style name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "PUSH",
            Self::Pull => "PULL",
            Self::Idle => "IDLE",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position within a PUSH or PULL topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    /// Ready to take the next command batch.
    FetchingCommands,
    /// PUSH sent, waiting for the ack.
    AwaitingAck,
    /// Ack received, batch not yet removed from the queue.
    DeletingCommands,
    /// Ready to request the next page.
    SendingPull,
    /// PULL sent, waiting for the page.
    AwaitingBatch,
    /// Page received, not yet merged.
    UpsertingBatch,
}

impl Step {
    /// Name as shown in inspection output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchingCommands => "fetchingCommands",
            Self::AwaitingAck => "awaitingAck",
            Self::DeletingCommands => "deletingCommands",
            Self::SendingPull => "sendingPull",
            Self::AwaitingBatch => "awaitingBatch",
            Self::UpsertingBatch => "upsertingBatch",
        }
    }

    /// True for the two steps that wait on the network.
    pub fn is_awaiting_reply(&self) -> bool {
        matches!(self, Self::AwaitingAck | Self::AwaitingBatch)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single legal protocol transition from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NextAction {
    /// Take the next command batch and send it.
    SentCommandBatch,
    /// Apply the server's push ack.
    CommandsAcked,
    /// Drop the acked batch from the queue.
    DeletedCommands,
    /// Send the next pull request.
    SentPull,
    /// Apply the server's pull reply.
    PullReceived,
    /// Merge the received page.
    UpsertedBatch,
}

impl NextAction {
    /// Human label for the manual "next" trigger.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SentCommandBatch => "Send next PUSH",
            Self::CommandsAcked => "Receive PUSH ack",
            Self::DeletedCommands => "Delete local commands",
            Self::SentPull => "Send next PULL",
            Self::PullReceived => "Receive PULL",
            Self::UpsertedBatch => "Upsert documents/cursor",
        }
    }

    /// Action type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SentCommandBatch => "sentCommandBatch",
            Self::CommandsAcked => "commandsAcked",
            Self::DeletedCommands => "deletedCommands",
            Self::SentPull => "sentPull",
            Self::PullReceived => "pullReceived",
            Self::UpsertedBatch => "upsertedBatch",
        }
    }

    /// Phases this transition can start from.
    pub(crate) fn enabled_in(&self, phase: &Phase) -> bool {
        match self {
            Self::SentCommandBatch => {
                matches!(phase, Phase::FetchingCommands { .. } | Phase::Idle)
            }
            Self::CommandsAcked => matches!(phase, Phase::AwaitingAck { .. }),
            Self::DeletedCommands => matches!(phase, Phase::DeletingCommands { .. }),
            Self::SentPull => matches!(
                phase,
                Phase::FetchingCommands { .. } | Phase::SendingPull { .. } | Phase::Idle
            ),
            Self::PullReceived => matches!(phase, Phase::AwaitingBatch { .. }),
            Self::UpsertedBatch => matches!(phase, Phase::UpsertingBatch { .. }),
        }
    }

    /// Push while commands are pending, otherwise pull.
    pub(crate) fn for_queue(commands: &[Command]) -> Self {
        if commands.is_empty() {
            Self::SentPull
        } else {
            Self::SentCommandBatch
        }
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One received page of the pull stream, keyed.
#[derive(Debug, Clone, PartialEq)]
pub struct PulledBatch {
    /// The page, keyed by record identity.
    pub records: RecordMap,
    /// Cursor the server handed out with this page.
    pub next_cursor: Option<Cursor>,
    /// Partition the page came from.
    pub location_id: LocationId,
}

/// Where in the cycle the client is, with the data that exists there.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// PUSH: ready to take a batch.
    FetchingCommands {
        /// Batches pushed in this PUSH run.
        batch_number: u32,
    },
    /// PUSH: batch sent, ack outstanding.
    AwaitingAck {
        /// Number of this batch within the PUSH run.
        batch_number: u32,
        /// The commands in flight, oldest first.
        last_batch: Vec<Command>,
    },
    /// PUSH: ack received, batch still queued.
    DeletingCommands {
        /// Number of this batch within the PUSH run.
        batch_number: u32,
        /// The acknowledged commands.
        last_batch: Vec<Command>,
    },
    /// PULL: ready to request the next page.
    SendingPull {
        /// Pages received in this PULL run.
        batch_number: u32,
        /// The page just merged.
        previous: PulledBatch,
    },
    /// PULL: request sent, page outstanding.
    AwaitingBatch {
        /// Number of the requested page within the PULL run.
        batch_number: u32,
        /// The page before, when continuing a stream.
        previous: Option<PulledBatch>,
    },
    /// PULL: page received, not yet merged.
    UpsertingBatch {
        /// Number of this page within the PULL run.
        batch_number: u32,
        /// The page.
        batch: PulledBatch,
    },
    /// Between cycles.
    Idle,
}

impl Phase {
    /// Topic this phase belongs to.
    pub fn topic(&self) -> Topic {
        match self {
            Self::FetchingCommands { .. }
            | Self::AwaitingAck { .. }
            | Self::DeletingCommands { .. } => Topic::Push,
            Self::SendingPull { .. } | Self::AwaitingBatch { .. } | Self::UpsertingBatch { .. } => {
                Topic::Pull
            }
            Self::Idle => Topic::Idle,
        }
    }

    /// Step within the topic (`None` when idle).
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::FetchingCommands { .. } => Some(Step::FetchingCommands),
            Self::AwaitingAck { .. } => Some(Step::AwaitingAck),
            Self::DeletingCommands { .. } => Some(Step::DeletingCommands),
            Self::SendingPull { .. } => Some(Step::SendingPull),
            Self::AwaitingBatch { .. } => Some(Step::AwaitingBatch),
            Self::UpsertingBatch { .. } => Some(Step::UpsertingBatch),
            Self::Idle => None,
        }
    }

    /// Batch counter of the current run (`None` when idle).
    pub fn batch_number(&self) -> Option<u32> {
        match self {
            Self::FetchingCommands { batch_number }
            | Self::AwaitingAck { batch_number, .. }
            | Self::DeletingCommands { batch_number, .. }
            | Self::SendingPull { batch_number, .. }
            | Self::AwaitingBatch { batch_number, .. }
            | Self::UpsertingBatch { batch_number, .. } => Some(*batch_number),
            Self::Idle => None,
        }
    }
}

/// Complete in-memory state of one sync client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientState {
    pub(crate) connected: bool,
    pub(crate) commands: Vec<Command>,
    pub(crate) total_commands_sent: usize,
    pub(crate) cursor: Option<Cursor>,
    pub(crate) records: RecordMap,
    pub(crate) total_docs_received: usize,
    pub(crate) last_action: Option<Action>,
    pub(crate) next_action: NextAction,
    pub(crate) active_location_id: Option<LocationId>,
    pub(crate) phase: Phase,
}

impl ClientState {
    /// Build the start-of-session state from a stored snapshot.
    ///
    /// Always starts at PUSH `fetchingCommands`, batch 0, with counters at
    /// zero and no last action.
    pub fn initialize(snapshot: PersistedSnapshot, connected: bool) -> Self {
        let next_action = NextAction::for_queue(&snapshot.commands);
        Self {
            connected,
            commands: snapshot.commands,
            total_commands_sent: 0,
            cursor: snapshot.cursor,
            records: RecordMap::from_docs(snapshot.records),
            total_docs_received: 0,
            last_action: None,
            next_action,
            active_location_id: snapshot.active_location_id,
            phase: Phase::FetchingCommands { batch_number: 0 },
        }
    }

    /// Project the durable part of the state.
    pub fn persisted(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            commands: self.commands.clone(),
            cursor: self.cursor.clone(),
            records: self.records.to_docs(),
            active_location_id: self.active_location_id.clone(),
        }
    }

    /// Whether `action` is legal here.
    ///
    /// Control actions are always legal. A protocol action is legal only when
    /// it is the current next action and the phase allows it.
    pub fn accepts(&self, action: &Action) -> bool {
        match action.protocol_kind() {
            Some(kind) => kind == self.next_action && kind.enabled_in(&self.phase),
            None => true,
        }
    }

    /// Transport connectivity as last reported.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Pending commands, oldest first.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Commands sent since the session started.
    pub fn total_commands_sent(&self) -> usize {
        self.total_commands_sent
    }

    /// Current pull cursor.
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Every record received so far.
    pub fn records(&self) -> &RecordMap {
        &self.records
    }

    /// Records received since the session started.
    pub fn total_docs_received(&self) -> usize {
        self.total_docs_received
    }

    /// The last applied action.
    pub fn last_action(&self) -> Option<&Action> {
        self.last_action.as_ref()
    }

    /// The single legal protocol transition from here.
    pub fn next_action(&self) -> NextAction {
        self.next_action
    }

    /// Partition learned from the last pull reply.
    pub fn active_location_id(&self) -> Option<&LocationId> {
        self.active_location_id.as_ref()
    }

    /// Current phase.
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Shorthand for `phase().topic()`.
    pub fn topic(&self) -> Topic {
        self.phase.topic()
    }

    /// Shorthand for `phase().step()`.
    pub fn step(&self) -> Option<Step> {
        self.phase.step()
    }

    /// Inspection view of the non-persisted fields.
    pub fn view(&self) -> StateView<'_> {
        let (last_batch_size, next_cursor) = match &self.phase {
            Phase::AwaitingAck { last_batch, .. } | Phase::DeletingCommands { last_batch, .. } => {
                (Some(last_batch.len()), None)
            }
            Phase::SendingPull { previous, .. }
            | Phase::AwaitingBatch {
                previous: Some(previous),
                ..
            } => (Some(previous.records.len()), previous.next_cursor.as_ref()),
            Phase::UpsertingBatch { batch, .. } => {
                (Some(batch.records.len()), batch.next_cursor.as_ref())
            }
            Phase::FetchingCommands { .. } | Phase::AwaitingBatch { previous: None, .. } | Phase::Idle => {
                (None, None)
            }
        };

        StateView {
            connected: self.connected,
            topic: self.topic(),
            step: self.step(),
            batch_number: self.phase.batch_number(),
            total_commands_sent: self.total_commands_sent,
            total_docs_received: self.total_docs_received,
            last_action: self.last_action.as_ref(),
            next_action_type: self.next_action,
            next_action_label: self.next_action.label(),
            last_batch_size,
            next_cursor,
        }
    }
}

/// Serializable snapshot of the in-memory-only state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView<'a> {
    /// Connectivity flag.
    pub connected: bool,
    /// Current topic.
    pub topic: Topic,
    /// Current step, absent when idle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
    /// Batch counter, absent when idle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<u32>,
    /// Commands sent this session.
    pub total_commands_sent: usize,
    /// Records received this session.
    pub total_docs_received: usize,
    /// Last applied action.
    pub last_action: Option<&'a Action>,
    /// Next legal protocol transition.
    pub next_action_type: NextAction,
    /// Its human label.
    pub next_action_label: &'static str,
    /// Size of the batch carried by the phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_batch_size: Option<usize>,
    /// Cursor carried by the phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<&'a Cursor>,
}
