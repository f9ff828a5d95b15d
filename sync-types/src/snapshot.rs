//! Durable form of a client's sync state.

use serde::{Deserialize, Serialize};

use crate::{Command, Cursor, Doc, LocationId, SyncError};

/// The subset of client state that survives a restart.
///
/// Stored as JSON, one file per client id. `records` is kept as an ordered
/// list; the client re-keys it on load.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    /// Unacknowledged commands, oldest first
    pub commands: Vec<Command>,
    /// Last adopted pull cursor
    pub cursor: Option<Cursor>,
    /// Every record received so far, in first-insertion order
    pub records: Vec<Doc>,
    /// Partition learned from the last PULL reply
    #[serde(default)]
    pub active_location_id: Option<LocationId>,
}

impl PersistedSnapshot {
    /// Decode a stored snapshot.
    pub fn from_json(input: &str) -> Result<Self, SyncError> {
        serde_json::from_str(input).map_err(SyncError::InvalidSnapshot)
    }

    /// Encode for storage.
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string_pretty(self).map_err(SyncError::Serialization)
    }
}
