//! Remote record snapshots and their identity keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Record type whose plain `id` is only unique within a category table.
pub const CATEGORY_TYPE: &str = "category";

/// A remote record as delivered by a PULL reply.
///
/// Fields beyond `id`, `type` and `updatedAt` are kept verbatim in `extra`
/// so a record survives a load/store round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doc {
    /// Record id, unique per type (per table for categories)
    pub id: String,
    /// Record type
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Server-side modification time
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    /// Everything else
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Doc {
    /// Build a record with no extra fields.
    pub fn new(
        id: impl Into<String>,
        doc_type: impl Into<String>,
        updated_at: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            updated_at: updated_at.into(),
            extra: Map::new(),
        }
    }

    /// Attach an extra field.
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Derive the identity key of this record.
    ///
    /// `type:id` for most records; categories also carry their table id:
    /// `category:tableId:id`. A category without a table id gets an empty
    /// table segment.
    pub fn key(&self) -> RecordKey {
        if self.doc_type == CATEGORY_TYPE {
            let table = match self.extra.get("categoryTableId") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            RecordKey(format!("{}:{}:{}", CATEGORY_TYPE, table, self.id))
        } else {
            RecordKey(format!("{}:{}", self.doc_type, self.id))
        }
    }
}

/// Identity key of a [`Doc`] in the client's record map.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({})", self.0)
    }
}
