//! # cmdsync-client
//!
//! Client library for cmdsync, a command-queue synchronization protocol.
//!
//! Applications queue commands locally; the client pushes them to a remote
//! in batches, then pulls the remote's records page by page.
//!
//! ## Features
//!
//! - **Pure State Machine**: Uses cmdsync-core for side-effect-free logic
//! - **Transport Abstraction**: Pluggable transport layer (loopback, mock)
//! - **Snapshot Persistence**: Every transition is written through a sink
//! - **Manual or Automatic Stepping**: One micro-step at a time, or run to idle
//!
//! ## Example
//!
//! ```ignore
//! use cmdsync_client::{FileSnapshotStore, LoopbackTransport, SyncClient, SyncConfig};
//!
//! let client = SyncClient::new(id, SyncConfig::default(), transport, store, snapshot);
//! client.connect().await?;
//! client.run_until_idle(None).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod listeners;
pub mod persist;
pub mod reply;
pub mod transport;
pub mod writer;

pub use client::{
    ClientError, ClientEvent, Delivery, SyncClient, SyncConfig, DEFAULT_PUSH_BATCH_SIZE,
};
pub use listeners::{Listener, Listeners, SubscriptionId};
pub use persist::{
    FileSnapshotStore, MemorySnapshotStore, SnapshotSink, SnapshotStore, StoreError,
};
pub use reply::{ReplySlot, SlotError};
pub use transport::{
    LoopbackTransport, MockTransport, RemoteConfig, RemoteStore, Transport, TransportError,
    COMMAND_DOC_TYPE,
};
pub use writer::SnapshotWriter;
