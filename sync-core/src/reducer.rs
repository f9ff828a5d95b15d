//! The transition function.
//!
//! [`reduce`] is pure and total: every (state, action) pair yields a state.
//! Illegal protocol actions leave the state untouched; callers that want
//! to know check [`ClientState::accepts`] first.

use crate::{Action, ClientState, NextAction, Phase, PulledBatch, RecordMap, Topic};

/// Apply one action.
pub fn reduce(state: ClientState, action: Action) -> ClientState {
    if !state.accepts(&action) {
        return state;
    }

    let mut state = state;
    let applied = action.clone();
    let phase = std::mem::replace(&mut state.phase, Phase::Idle);

    let (phase, next_action) = match (phase, action) {
        // PUSH
        (phase, Action::SentCommandBatch { limit }) => {
            let batch_number = next_batch_number(&phase, Topic::Push);
            let take = limit.min(state.commands.len());
            let last_batch = state.commands[..take].to_vec();
            state.total_commands_sent += last_batch.len();
            (
                Phase::AwaitingAck {
                    batch_number,
                    last_batch,
                },
                NextAction::CommandsAcked,
            )
        }
        (
            Phase::AwaitingAck {
                batch_number,
                last_batch,
            },
            Action::CommandsAcked,
        ) => (
            Phase::DeletingCommands {
                batch_number,
                last_batch,
            },
            NextAction::DeletedCommands,
        ),
        (
            Phase::DeletingCommands {
                batch_number,
                last_batch,
            },
            Action::DeletedCommands,
        ) => {
            let done = last_batch.len().min(state.commands.len());
            state.commands = state.commands.split_off(done);
            (
                Phase::FetchingCommands { batch_number },
                NextAction::for_queue(&state.commands),
            )
        }

        // PULL
        (phase, Action::SentPull) => {
            let batch_number = next_batch_number(&phase, Topic::Pull);
            let previous = match phase {
                Phase::SendingPull { previous, .. } => Some(previous),
                _ => None,
            };
            (
                Phase::AwaitingBatch {
                    batch_number,
                    previous,
                },
                NextAction::PullReceived,
            )
        }
        (
            Phase::AwaitingBatch { batch_number, .. },
            Action::PullReceived {
                location_id,
                records,
                next_cursor,
            },
        ) => {
            state.total_docs_received += records.len();
            let batch = PulledBatch {
                records: RecordMap::from_docs(records),
                next_cursor,
                location_id,
            };
            (
                Phase::UpsertingBatch {
                    batch_number,
                    batch,
                },
                NextAction::UpsertedBatch,
            )
        }
        (
            Phase::UpsertingBatch {
                batch_number,
                batch,
            },
            Action::UpsertedBatch,
        ) => {
            state.records.merge(&batch.records);
            state.active_location_id = Some(batch.location_id.clone());
            if batch.records.is_empty() {
                // Stream drained: cursor stays where it is.
                (Phase::Idle, NextAction::for_queue(&state.commands))
            } else {
                state.cursor = batch.next_cursor.clone();
                (
                    Phase::SendingPull {
                        batch_number,
                        previous: batch,
                    },
                    NextAction::SentPull,
                )
            }
        }

        // Control
        (phase, Action::ConnectionChanged { connected }) => {
            if connected == state.connected {
                state.phase = phase;
                return state;
            }
            state.connected = connected;
            let phase = if connected {
                Phase::FetchingCommands { batch_number: 0 }
            } else {
                Phase::Idle
            };
            (phase, NextAction::for_queue(&state.commands))
        }
        (_, Action::Interrupted) => {
            return ClientState::initialize(state.persisted(), false);
        }
        // Queue only: lastAction keeps naming the last protocol step
        (phase, Action::Command { command }) => {
            state.commands.push(command);
            if matches!(phase, Phase::Idle) {
                state.next_action = NextAction::SentCommandBatch;
            }
            state.phase = phase;
            return state;
        }

        // Unreachable once `accepts` passed; keep the state as it was
        (phase, _) => {
            state.phase = phase;
            return state;
        }
    };

    state.phase = phase;
    state.next_action = next_action;
    state.last_action = Some(applied);
    state
}

/// Previous batch number + 1 within the same topic, else 1.
fn next_batch_number(phase: &Phase, topic: Topic) -> u32 {
    match phase.batch_number() {
        Some(n) if phase.topic() == topic => n.saturating_add(1),
        _ => 1,
    }
}
