//! Error types for cmdsync wire handling.

use thiserror::Error;

/// Errors that can occur while decoding or validating cmdsync data.
///
/// None of these are fatal to a connection: the caller drops the offending
/// input and carries on.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Input was not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// JSON value was not an object
    #[error("message is not an object")]
    NotAnObject,

    /// Object has no string `topic` field
    #[error("message has no string topic")]
    MissingTopic,

    /// Topic is not one this client understands
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Topic was recognized but the payload has the wrong shape
    #[error("invalid {topic} payload: {source}")]
    InvalidPayload {
        /// Topic of the rejected message.
        topic: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// User-supplied command data is missing `action` or `properties`
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Persisted snapshot has the wrong shape
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[source] serde_json::Error),

    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Client id is not a UUID v4
    #[error("invalid client id: {0}")]
    InvalidClientId(String),
}
