//! Pure half of the effect driver.
//!
//! These functions decide what the client should do next: which request a
//! transition calls for, which local step to take, and how a server reply
//! turns into an action. `sync-client` performs the I/O.

use cmdsync_types::{InboundMessage, OutboundMessage, PullMessage, PushMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::{Action, ClientState, NextAction, Phase};

/// How strictly push acknowledgements are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckPolicy {
    /// Any `PUSH` reply acknowledges the batch.
    #[default]
    Any,
    /// The reply must list exactly the sent command ids in `processed`.
    Strict,
}

/// The reply a waiting state expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwaitedReply {
    /// Ack for the batch with these command ids.
    Ack {
        /// Ids of the commands in flight.
        command_ids: Vec<String>,
    },
    /// The next pull page.
    Batch,
}

impl AwaitedReply {
    /// What `state` is waiting for, if anything.
    pub fn for_state(state: &ClientState) -> Option<Self> {
        match state.phase() {
            Phase::AwaitingAck { last_batch, .. } => Some(Self::Ack {
                command_ids: last_batch.iter().map(|c| c.id.clone()).collect(),
            }),
            Phase::AwaitingBatch { .. } => Some(Self::Batch),
            _ => None,
        }
    }

    /// Topic of the expected reply.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Ack { .. } => cmdsync_types::TOPIC_PUSH,
            Self::Batch => cmdsync_types::TOPIC_PULL,
        }
    }
}

/// Why a reply could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyRejection {
    /// Reply topic differs from the outstanding request.
    #[error("expected {expected} reply, got {got}")]
    WrongTopic {
        /// Topic of the outstanding request.
        expected: &'static str,
        /// Topic received.
        got: &'static str,
    },

    /// Strict ack without a `processed` list.
    #[error("ack does not list processed commands")]
    MissingProcessed,

    /// Strict ack whose ids differ from the sent batch.
    #[error("ack lists {processed} processed ids, batch had {sent}")]
    ProcessedMismatch {
        /// Commands sent.
        sent: usize,
        /// Ids reported.
        processed: usize,
    },
}

/// The request a transition from `prev` to `next` calls for.
///
/// Only entering `awaitingAck` or `awaitingBatch` sends anything.
pub fn request_for(prev: &ClientState, next: &ClientState) -> Option<OutboundMessage> {
    if prev.step() == next.step() {
        return None;
    }
    match next.phase() {
        Phase::AwaitingAck { last_batch, .. } => Some(OutboundMessage::Push(PushMessage {
            commands: last_batch.clone(),
        })),
        Phase::AwaitingBatch { .. } => Some(OutboundMessage::Pull(PullMessage {
            location_id: next.active_location_id().cloned(),
            cursor: next.cursor().cloned(),
        })),
        _ => None,
    }
}

/// The local action that advances `state`, or `None` while a reply is due.
pub fn local_action(state: &ClientState, push_batch_size: usize) -> Option<Action> {
    match state.phase() {
        Phase::FetchingCommands { .. } | Phase::Idle => match state.next_action() {
            NextAction::SentCommandBatch => Some(Action::SentCommandBatch {
                limit: push_batch_size,
            }),
            NextAction::SentPull => Some(Action::SentPull),
            _ => None,
        },
        Phase::DeletingCommands { .. } => Some(Action::DeletedCommands),
        Phase::SendingPull { .. } => Some(Action::SentPull),
        Phase::UpsertingBatch { .. } => Some(Action::UpsertedBatch),
        Phase::AwaitingAck { .. } | Phase::AwaitingBatch { .. } => None,
    }
}

/// Turn a server reply into the action it stands for.
pub fn reply_action(
    expected: &AwaitedReply,
    reply: InboundMessage,
    policy: AckPolicy,
) -> Result<Action, ReplyRejection> {
    match (expected, reply) {
        (AwaitedReply::Ack { command_ids }, InboundMessage::Push(ack)) => {
            if policy == AckPolicy::Strict {
                let processed = ack.processed.ok_or(ReplyRejection::MissingProcessed)?;
                let sent: HashSet<&str> = command_ids.iter().map(String::as_str).collect();
                let acked: HashSet<&str> = processed.iter().map(String::as_str).collect();
                if sent != acked {
                    return Err(ReplyRejection::ProcessedMismatch {
                        sent: command_ids.len(),
                        processed: processed.len(),
                    });
                }
            }
            Ok(Action::CommandsAcked)
        }
        (AwaitedReply::Batch, InboundMessage::Pull(page)) => Ok(Action::PullReceived {
            location_id: page.location_id,
            records: page.records,
            next_cursor: page.next_cursor,
        }),
        (expected, reply) => Err(ReplyRejection::WrongTopic {
            expected: expected.topic(),
            got: reply.topic(),
        }),
    }
}
