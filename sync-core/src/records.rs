//! The client's materialized view of pulled records.

use cmdsync_types::{Doc, RecordKey};
use serde::ser::{Serialize, Serializer};
use std::collections::HashMap;

/// Records keyed by [`Doc::key`], in first-insertion order.
///
/// Upserting an existing key replaces the record in place; the key keeps
/// its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMap {
    entries: Vec<(RecordKey, Doc)>,
    index: HashMap<RecordKey, usize>,
}

impl RecordMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Key a sequence of records. Later duplicates overwrite earlier ones.
    pub fn from_docs(docs: impl IntoIterator<Item = Doc>) -> Self {
        let mut map = Self::new();
        for doc in docs {
            map.upsert(doc);
        }
        map
    }

    /// Insert or replace a record. Returns true if the key was new.
    pub fn upsert(&mut self, doc: Doc) -> bool {
        let key = doc.key();
        match self.index.get(&key) {
            Some(&pos) => {
                self.entries[pos].1 = doc;
                false
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, doc));
                true
            }
        }
    }

    /// Upsert every record of `batch`, last write wins.
    pub fn merge(&mut self, batch: &RecordMap) {
        for (_, doc) in &batch.entries {
            self.upsert(doc.clone());
        }
    }

    /// Look up a record by key.
    pub fn get(&self, key: &RecordKey) -> Option<&Doc> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &Doc)> {
        self.entries.iter().map(|(key, doc)| (key, doc))
    }

    /// The records as a sequence, in insertion order.
    pub fn to_docs(&self) -> Vec<Doc> {
        self.entries.iter().map(|(_, doc)| doc.clone()).collect()
    }
}

impl Serialize for RecordMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}
