//! Protocol messages for cmdsync.
//!
//! Every frame is a JSON object with a string `topic`. The client sends
//! `PUSH` and `PULL` requests; the server answers with `PUSH`, `PULL` or a
//! keepalive `PONG`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Command, Cursor, Doc, LocationId, SyncError};

/// Topic string of push frames.
pub const TOPIC_PUSH: &str = "PUSH";
/// Topic string of pull frames.
pub const TOPIC_PULL: &str = "PULL";
/// Topic string of keepalive frames.
pub const TOPIC_PONG: &str = "PONG";

/// Requests sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum OutboundMessage {
    /// Upload a batch of commands
    #[serde(rename = "PUSH")]
    Push(PushMessage),
    /// Ask for the next page of records
    #[serde(rename = "PULL")]
    Pull(PullMessage),
}

impl OutboundMessage {
    /// Topic string of this request.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Push(_) => TOPIC_PUSH,
            Self::Pull(_) => TOPIC_PULL,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }

    /// Decode a JSON text frame (server side of the loopback store).
    pub fn from_json(input: &str) -> Result<Self, SyncError> {
        serde_json::from_str(input).map_err(SyncError::InvalidJson)
    }
}

/// Upload a batch of commands, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// The batch
    pub commands: Vec<Command>,
}

/// Request the page after `cursor` in partition `location_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullMessage {
    /// Partition learned from a previous reply (null on first contact)
    pub location_id: Option<LocationId>,
    /// Position in the stream (null = start)
    pub cursor: Option<Cursor>,
}

/// Frames received from the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic")]
pub enum InboundMessage {
    /// Acknowledgement of the outstanding push
    #[serde(rename = "PUSH")]
    Push(PushReply),
    /// One page of records
    #[serde(rename = "PULL")]
    Pull(PullReply),
    /// Keepalive, never dispatched to the state machine
    #[serde(rename = "PONG")]
    Pong,
}

impl InboundMessage {
    /// Topic string of this frame.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Push(_) => TOPIC_PUSH,
            Self::Pull(_) => TOPIC_PULL,
            Self::Pong => TOPIC_PONG,
        }
    }

    /// Decode and classify a JSON text frame.
    ///
    /// Any object with `topic: "PUSH"` is a push acknowledgement; a
    /// `processed` list is picked up when it is an array of strings and
    /// ignored otherwise.
    pub fn from_json(input: &str) -> Result<Self, SyncError> {
        let value: Value = serde_json::from_str(input).map_err(SyncError::InvalidJson)?;
        let topic = match &value {
            Value::Object(obj) => match obj.get("topic") {
                Some(Value::String(topic)) => topic.clone(),
                _ => return Err(SyncError::MissingTopic),
            },
            _ => return Err(SyncError::NotAnObject),
        };

        match topic.as_str() {
            TOPIC_PONG => Ok(Self::Pong),
            TOPIC_PUSH => Ok(Self::Push(PushReply {
                processed: processed_ids(&value),
            })),
            TOPIC_PULL => serde_json::from_value(value)
                .map(Self::Pull)
                .map_err(|source| SyncError::InvalidPayload {
                    topic: TOPIC_PULL,
                    source,
                }),
            _ => Err(SyncError::UnknownTopic(topic)),
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }
}

fn processed_ids(value: &Value) -> Option<Vec<String>> {
    value
        .get("processed")?
        .as_array()?
        .iter()
        .map(|id| id.as_str().map(str::to_string))
        .collect()
}

/// Server acknowledgement of a push.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PushReply {
    /// Ids the server reports as processed, if it says
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<Vec<String>>,
}

/// One page of the pull stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReply {
    /// Partition the page belongs to
    pub location_id: LocationId,
    /// Changed records (empty = stream drained)
    pub records: Vec<Doc>,
    /// Cursor for the following page
    pub next_cursor: Option<Cursor>,
}
