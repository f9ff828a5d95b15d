//! Durable per-client snapshots.
//!
//! The client queues every new [`PersistedSnapshot`] for a [`SnapshotSink`]
//! and moves on; failures are logged, never returned. Start-up goes through
//! a [`SnapshotStore`].

use async_trait::async_trait;
use cmdsync_types::{ClientId, PersistedSnapshot, SyncError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, error, warn};

const FILE_PREFIX: &str = "client-";
const FILE_SUFFIX: &str = ".json";

/// Snapshot storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No snapshot stored for this client.
    #[error("no stored client {0}")]
    NotFound(ClientId),

    /// Reading failed.
    #[error("failed to read {}: {}", .path.display(), .source)]
    Read {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing failed.
    #[error("failed to write {}: {}", .path.display(), .source)]
    Write {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stored data has the wrong shape.
    #[error("invalid data in {}: {}", .path.display(), .source)]
    Invalid {
        /// File involved.
        path: PathBuf,
        /// Decode error.
        #[source]
        source: SyncError,
    },
}

/// Receives the snapshot after every transition.
#[async_trait]
pub trait SnapshotSink: Send + Sync + 'static {
    /// Persist `snapshot` for `client_id`. Fire-and-forget.
    async fn on_snapshot_changed(&self, client_id: ClientId, snapshot: &PersistedSnapshot);
}

/// Keyed snapshot storage.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store (or overwrite) a snapshot.
    async fn save(&self, client_id: ClientId, snapshot: &PersistedSnapshot)
        -> Result<(), StoreError>;

    /// Load a stored snapshot.
    async fn load(&self, client_id: ClientId) -> Result<PersistedSnapshot, StoreError>;

    /// Ids of every client with a valid stored snapshot.
    async fn list(&self) -> Result<Vec<ClientId>, StoreError>;

    /// Remove a client's snapshot.
    async fn delete(&self, client_id: ClientId) -> Result<(), StoreError>;

    /// Register a new client with an empty snapshot.
    async fn create(&self) -> Result<ClientId, StoreError> {
        let client_id = ClientId::new();
        self.save(client_id, &PersistedSnapshot::default()).await?;
        Ok(client_id)
    }
}

/// Snapshots as `client-<uuid>.json` files in one directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File holding `client_id`'s snapshot.
    pub fn path_for(&self, client_id: ClientId) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, client_id, FILE_SUFFIX))
    }

    async fn read_valid(&self, path: &Path) -> Option<PersistedSnapshot> {
        let contents = tokio::fs::read_to_string(path).await.ok()?;
        match PersistedSnapshot::from_json(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping invalid snapshot");
                None
            }
        }
    }
}

/// Client id encoded in a snapshot file name, if it is one.
fn client_id_from_file_name(name: &str) -> Option<ClientId> {
    let id = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    ClientId::parse(id).ok()
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(
        &self,
        client_id: ClientId,
        snapshot: &PersistedSnapshot,
    ) -> Result<(), StoreError> {
        let path = self.path_for(client_id);
        let contents = snapshot.to_json().map_err(|source| StoreError::Invalid {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        set_file_permissions_0600(&path).await
    }

    async fn load(&self, client_id: ClientId) -> Result<PersistedSnapshot, StoreError> {
        let path = self.path_for(client_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(client_id));
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        PersistedSnapshot::from_json(&contents).map_err(|source| StoreError::Invalid { path, source })
    }

    async fn list(&self) -> Result<Vec<ClientId>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut ids = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(StoreError::Read {
                        path: self.dir.clone(),
                        source,
                    })
                }
            };
            let name = entry.file_name();
            let Some(client_id) = name.to_str().and_then(client_id_from_file_name) else {
                continue;
            };
            if self.read_valid(&entry.path()).await.is_some() {
                ids.push(client_id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, client_id: ClientId) -> Result<(), StoreError> {
        let path = self.path_for(client_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(client = %client_id, "Deleted snapshot");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(client_id))
            }
            Err(source) => Err(StoreError::Write { path, source }),
        }
    }
}

#[async_trait]
impl SnapshotSink for FileSnapshotStore {
    async fn on_snapshot_changed(&self, client_id: ClientId, snapshot: &PersistedSnapshot) {
        if let Err(e) = self.save(client_id, snapshot).await {
            error!(client = %client_id, error = %e, "Failed to persist snapshot");
        }
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|source| StoreError::Write {
                path: path.to_path_buf(),
                source,
            })?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// In-memory store for tests and embedding.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    snapshots: BTreeMap<ClientId, PersistedSnapshot>,
    writes: usize,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current snapshot for `client_id`.
    pub fn get(&self, client_id: ClientId) -> Option<PersistedSnapshot> {
        self.lock().snapshots.get(&client_id).cloned()
    }

    /// Number of saves so far.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(
        &self,
        client_id: ClientId,
        snapshot: &PersistedSnapshot,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.snapshots.insert(client_id, snapshot.clone());
        inner.writes += 1;
        Ok(())
    }

    async fn load(&self, client_id: ClientId) -> Result<PersistedSnapshot, StoreError> {
        self.get(client_id).ok_or(StoreError::NotFound(client_id))
    }

    async fn list(&self) -> Result<Vec<ClientId>, StoreError> {
        Ok(self.lock().snapshots.keys().copied().collect())
    }

    async fn delete(&self, client_id: ClientId) -> Result<(), StoreError> {
        self.lock()
            .snapshots
            .remove(&client_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(client_id))
    }
}

#[async_trait]
impl SnapshotSink for MemorySnapshotStore {
    async fn on_snapshot_changed(&self, client_id: ClientId, snapshot: &PersistedSnapshot) {
        // Infallible
        let _ = self.save(client_id, snapshot).await;
    }
}
