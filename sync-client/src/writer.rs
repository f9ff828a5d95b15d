//! Background snapshot writer.
//!
//! Transitions queue snapshots here and return at once. One task drains the
//! queue into the [`SnapshotSink`], so writes land in transition order and a
//! slow sink never holds up the state machine.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use cmdsync_types::{ClientId, PersistedSnapshot};

use crate::persist::SnapshotSink;

enum WriterMessage {
    Snapshot(PersistedSnapshot),
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task for one client.
///
/// Dropping the handle lets the task finish the queued writes and exit.
pub struct SnapshotWriter {
    client_id: ClientId,
    tx: mpsc::UnboundedSender<WriterMessage>,
}

impl SnapshotWriter {
    /// Spawn the writer task. Must be called within a Tokio runtime.
    pub fn spawn<S: SnapshotSink>(client_id: ClientId, sink: Arc<S>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    WriterMessage::Snapshot(snapshot) => {
                        sink.on_snapshot_changed(client_id, &snapshot).await;
                    }
                    WriterMessage::Flush(done) => {
                        if done.send(()).is_err() {
                            debug!(client = %client_id, "Flush waiter went away");
                        }
                    }
                }
            }
            debug!(client = %client_id, "Snapshot writer stopped");
        });
        Self { client_id, tx }
    }

    /// Queue a snapshot. Never waits on the sink.
    pub fn write(&self, snapshot: PersistedSnapshot) {
        if self.tx.send(WriterMessage::Snapshot(snapshot)).is_err() {
            error!(client = %self.client_id, "Snapshot writer is gone, snapshot not persisted");
        }
    }

    /// Wait until every snapshot queued so far has been handed to the sink.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(WriterMessage::Flush(done)).is_err() {
            error!(client = %self.client_id, "Snapshot writer is gone, nothing to flush");
            return;
        }
        if wait.await.is_err() {
            error!(client = %self.client_id, "Snapshot writer stopped before flushing");
        }
    }
}
