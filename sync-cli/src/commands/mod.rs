//! CLI command implementations.

pub mod clients;
pub mod command;
pub mod inspect;
pub mod seed;
pub mod sync;

use anyhow::{Context, Result};
use std::path::Path;

use cmdsync_client::{FileSnapshotStore, SnapshotStore, StoreError};
use cmdsync_types::{ClientId, PersistedSnapshot};

/// Snapshot files live directly in the data directory.
pub(crate) fn snapshot_store(data_dir: &Path) -> FileSnapshotStore {
    FileSnapshotStore::new(data_dir)
}

pub(crate) fn parse_client_id(id: &str) -> Result<ClientId> {
    ClientId::parse(id).with_context(|| format!("Invalid client id '{}'", id))
}

pub(crate) async fn load_snapshot(
    store: &FileSnapshotStore,
    client_id: ClientId,
) -> Result<PersistedSnapshot> {
    match store.load(client_id).await {
        Ok(snapshot) => Ok(snapshot),
        Err(StoreError::NotFound(_)) => {
            anyhow::bail!("No client {}. Run 'cmdsync list' to see stored clients.", client_id)
        }
        Err(e) => Err(e).context("Failed to load client snapshot"),
    }
}
