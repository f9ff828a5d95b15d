//! Client registry: add, list and delete stored clients.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use cmdsync_client::{SnapshotStore, StoreError};
use cmdsync_types::ClientId;

use super::{parse_client_id, snapshot_store};

/// Register a new client and print its id.
pub async fn add(data_dir: &Path) -> Result<ClientId> {
    let store = snapshot_store(data_dir);
    let client_id = store.create().await.context("Failed to create client")?;

    info!(client = %client_id, "Client added");
    println!("{}", client_id);
    Ok(client_id)
}

/// Print every stored client id, one per line.
pub async fn list(data_dir: &Path) -> Result<Vec<ClientId>> {
    let store = snapshot_store(data_dir);
    let ids = store.list().await.context("Failed to list clients")?;

    for id in &ids {
        println!("{}", id);
    }
    Ok(ids)
}

/// Delete a client's snapshot.
pub async fn delete(data_dir: &Path, id: &str) -> Result<()> {
    let client_id = parse_client_id(id)?;
    let store = snapshot_store(data_dir);

    match store.delete(client_id).await {
        Ok(()) => {
            info!(client = %client_id, "Client deleted");
            println!("Deleted {}", client_id);
            Ok(())
        }
        Err(StoreError::NotFound(_)) => anyhow::bail!("No client {}", client_id),
        Err(e) => Err(e).context("Failed to delete client"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn add_then_list() {
        let dir = tempdir().unwrap();

        let a = add(dir.path()).await.unwrap();
        let b = add(dir.path()).await.unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(list(dir.path()).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn list_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let id = add(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("remote.json"), "{}")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("client-nope.json"), "{}")
            .await
            .unwrap();

        assert_eq!(list(dir.path()).await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn delete_removes_client() {
        let dir = tempdir().unwrap();
        let id = add(dir.path()).await.unwrap();

        delete(dir.path(), &id.to_string()).await.unwrap();

        assert!(list(dir.path()).await.unwrap().is_empty());
        assert!(delete(dir.path(), &id.to_string()).await.is_err());
    }

    #[tokio::test]
    async fn delete_rejects_bad_id() {
        let dir = tempdir().unwrap();
        assert!(delete(dir.path(), "not-a-uuid").await.is_err());
    }
}
