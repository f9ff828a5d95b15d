//! Property-based tests for the reducer and driver
//!
//! These tests verify key invariants hold across arbitrary action sequences.

use crate::*;
use cmdsync_types::{Command, Cursor, Doc, LocationId, PersistedSnapshot};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_command() -> impl Strategy<Value = Command> {
    ("[a-z0-9]{8}", "[a-z]{1,10}").prop_map(|(id, action)| Command {
        id,
        action,
        properties: serde_json::Map::new(),
        timestamp: "2024-01-01T00:00:00.000Z".into(),
    })
}

fn arb_doc() -> impl Strategy<Value = Doc> {
    (
        "[a-z0-9]{1,3}",
        prop_oneof![Just("item"), Just("product"), Just("category")],
        proptest::option::of("[a-c]"),
        "[0-9]{1,4}",
    )
        .prop_map(|(id, doc_type, table, stamp)| {
            let doc = Doc::new(id, doc_type, stamp);
            match table {
                Some(table) if doc_type == "category" => {
                    doc.with_field("categoryTableId", json!(table))
                }
                _ => doc,
            }
        })
}

fn arb_cursor() -> impl Strategy<Value = Option<Cursor>> {
    proptest::option::of("c[0-9]{1,3}".prop_map(Cursor::new))
}

/// Snapshots whose records have unique keys.
fn arb_snapshot() -> impl Strategy<Value = PersistedSnapshot> {
    (
        proptest::collection::vec(arb_command(), 0..6),
        arb_cursor(),
        proptest::collection::vec(arb_doc(), 0..8),
        proptest::option::of("loc-[0-9]".prop_map(LocationId::new)),
    )
        .prop_map(|(commands, cursor, docs, active_location_id)| {
            let records = docs
                .into_iter()
                .enumerate()
                .map(|(i, mut doc)| {
                    doc.id = format!("{}-{}", doc.id, i);
                    doc
                })
                .collect();
            PersistedSnapshot {
                commands,
                cursor,
                records,
                active_location_id,
            }
        })
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (1usize..4).prop_map(|limit| Action::SentCommandBatch { limit }),
        Just(Action::CommandsAcked),
        Just(Action::DeletedCommands),
        Just(Action::SentPull),
        (proptest::collection::vec(arb_doc(), 0..4), arb_cursor()).prop_map(
            |(records, next_cursor)| Action::PullReceived {
                location_id: LocationId::new("loc-1"),
                records,
                next_cursor,
            }
        ),
        Just(Action::UpsertedBatch),
        any::<bool>().prop_map(|connected| Action::ConnectionChanged { connected }),
        arb_command().prop_map(|command| Action::Command { command }),
    ]
}

fn arb_state() -> impl Strategy<Value = ClientState> {
    (
        arb_snapshot(),
        any::<bool>(),
        proptest::collection::vec(arb_action(), 0..40),
    )
        .prop_map(|(snapshot, connected, actions)| {
            actions
                .into_iter()
                .fold(ClientState::initialize(snapshot, connected), reduce)
        })
}

/// Drive a connected client through local steps, acking every push.
fn drive_push(mut state: ClientState, limit: usize) -> (ClientState, usize) {
    let mut batches = 0;
    while state.next_action() != NextAction::SentPull {
        let action = match local_action(&state, limit) {
            Some(action) => action,
            None => Action::CommandsAcked,
        };
        if matches!(action, Action::SentCommandBatch { .. }) {
            batches += 1;
        }
        state = reduce(state, action);
    }
    (state, batches)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn queue_drains_in_ceil_n_over_l_batches(
        commands in proptest::collection::vec(arb_command(), 0..30),
        limit in 1usize..8,
    ) {
        let n = commands.len();
        let snapshot = PersistedSnapshot { commands, ..Default::default() };
        let state = ClientState::initialize(snapshot, true);

        let (state, batches) = drive_push(state, limit);

        prop_assert_eq!(batches, n.div_ceil(limit));
        prop_assert_eq!(state.total_commands_sent(), n);
        prop_assert!(state.commands().is_empty());
        prop_assert_eq!(state.topic(), Topic::Push);
    }

    #[test]
    fn snapshot_round_trip_is_fixed_point(
        snapshot in arb_snapshot(),
        connected in any::<bool>(),
    ) {
        let state = ClientState::initialize(snapshot.clone(), connected);
        prop_assert_eq!(state.persisted(), snapshot);
    }

    #[test]
    fn cursor_moves_only_on_non_empty_upsert(
        state in arb_state(),
        action in arb_action(),
    ) {
        let batch_len = match state.phase() {
            Phase::UpsertingBatch { batch, .. } => Some(batch.records.len()),
            _ => None,
        };
        let accepted = state.accepts(&action);
        let is_upsert = matches!(action, Action::UpsertedBatch);
        let before = state.cursor().cloned();

        let after = reduce(state, action);

        if after.cursor().cloned() != before {
            prop_assert!(accepted && is_upsert);
            prop_assert!(batch_len.unwrap_or(0) > 0);
        }
        if accepted && is_upsert && batch_len == Some(0) {
            prop_assert_eq!(after.topic(), Topic::Idle);
        }
    }

    #[test]
    fn merging_same_batch_twice_is_idempotent(
        base in proptest::collection::vec(arb_doc(), 0..10),
        batch in proptest::collection::vec(arb_doc(), 0..10),
    ) {
        let batch = RecordMap::from_docs(batch);
        let mut once = RecordMap::from_docs(base);
        once.merge(&batch);
        let mut twice = once.clone();
        twice.merge(&batch);
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn interrupted_always_resets_to_entry_state(state in arb_state()) {
        let pending = !state.commands().is_empty();
        let snapshot = state.persisted();

        let reset = reduce(state, Action::Interrupted);

        prop_assert!(!reset.is_connected());
        prop_assert_eq!(reset.phase(), &Phase::FetchingCommands { batch_number: 0 });
        let expected = if pending { NextAction::SentCommandBatch } else { NextAction::SentPull };
        prop_assert_eq!(reset.next_action(), expected);
        prop_assert_eq!(reset.total_commands_sent(), 0);
        prop_assert!(reset.last_action().is_none());
        prop_assert_eq!(reset.persisted(), snapshot);
    }

    #[test]
    fn rejected_actions_change_nothing(state in arb_state(), action in arb_action()) {
        if !state.accepts(&action) {
            let before = state.clone();
            prop_assert_eq!(reduce(state, action), before);
        }
    }

    #[test]
    fn unchanged_connection_flag_is_identity(state in arb_state()) {
        let connected = state.is_connected();
        let before = state.clone();
        prop_assert_eq!(reduce(state, Action::ConnectionChanged { connected }), before);
    }

    #[test]
    fn next_action_is_always_enabled(state in arb_state()) {
        prop_assert!(state.next_action().enabled_in(state.phase()));
    }
}
