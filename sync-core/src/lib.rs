//! # cmdsync-core
//!
//! Pure logic for cmdsync (no I/O, instant tests).
//!
//! This crate implements the push/pull state machine: the state model, the
//! reducer that is its only writer, and the pure half of the driver that
//! decides which request or local step comes next.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (network, disk) is performed by `sync-client`, which
//! sends the requests and feeds replies back in as actions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod driver;
pub mod records;
pub mod reducer;
pub mod state;

#[cfg(test)]
mod proptests;

pub use action::Action;
pub use driver::{local_action, reply_action, request_for, AckPolicy, AwaitedReply, ReplyRejection};
pub use records::RecordMap;
pub use reducer::reduce;
pub use state::{ClientState, NextAction, Phase, PulledBatch, StateView, Step, Topic};
