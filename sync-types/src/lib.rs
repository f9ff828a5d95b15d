//! # cmdsync-types
//!
//! Wire format types for the cmdsync push/pull protocol.
//!
//! This crate provides the foundational types used across all cmdsync crates:
//! - [`ClientId`], [`Cursor`], [`LocationId`] - Identity and ordering types
//! - [`Command`], [`CommandData`] - Queued local mutations
//! - [`Doc`], [`RecordKey`] - Remote records and their identity
//! - [`OutboundMessage`], [`InboundMessage`] - Protocol frames (PUSH, PULL, PONG)
//! - [`PersistedSnapshot`] - Durable client state
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod command;
mod doc;
mod error;
mod ids;
mod messages;
mod snapshot;

pub use command::{Command, CommandData};
pub use doc::{Doc, RecordKey, CATEGORY_TYPE};
pub use error::SyncError;
pub use ids::{ClientId, Cursor, LocationId};
pub use messages::{
    InboundMessage, OutboundMessage, PullMessage, PullReply, PushMessage, PushReply, TOPIC_PONG,
    TOPIC_PULL, TOPIC_PUSH,
};
pub use snapshot::PersistedSnapshot;
