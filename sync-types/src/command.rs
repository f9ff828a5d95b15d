//! Local mutation intents ("commands").

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::SyncError;

/// A queued local mutation, opaque to the sync engine.
///
/// Immutable once created. Owned by the command queue until the server has
/// acknowledged it and the client has deleted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Unique id (UUID v4 unless the caller supplied one)
    pub id: String,
    /// Application-defined action name
    pub action: String,
    /// Action arguments
    pub properties: Map<String, Value>,
    /// RFC 3339 creation time, e.g. `2024-05-01T12:00:00.000Z`
    pub timestamp: String,
}

/// User-supplied command data; `id` and `timestamp` are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandData {
    /// Application-defined action name
    pub action: String,
    /// Action arguments (must be a JSON object)
    pub properties: Map<String, Value>,
    /// Caller-chosen id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Caller-chosen timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl CommandData {
    /// Command data with no preassigned id or timestamp.
    pub fn new(action: impl Into<String>, properties: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            properties,
            id: None,
            timestamp: None,
        }
    }

    /// Parse and validate user-supplied JSON.
    ///
    /// `action` must be a string and `properties` an object.
    pub fn from_json(input: &str) -> Result<Self, SyncError> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| SyncError::InvalidCommand(e.to_string()))?;
        if !value.is_object() {
            return Err(SyncError::InvalidCommand("expected an object".into()));
        }
        serde_json::from_value(value).map_err(|e| SyncError::InvalidCommand(e.to_string()))
    }

    /// Finalize into a [`Command`], filling in a fresh id and the current
    /// time where absent.
    pub fn into_command(self) -> Command {
        self.into_command_at(Utc::now())
    }

    /// Finalize into a [`Command`] using `now` for a missing timestamp.
    pub fn into_command_at(self, now: DateTime<Utc>) -> Command {
        Command {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            action: self.action,
            properties: self.properties,
            timestamp: self
                .timestamp
                .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}
