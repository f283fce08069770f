//! In-memory store of fetched resources
//!
//! A plain mapping from resource identifier to its last fetched value. The
//! store has no locking of its own; [`Cache`](super::Cache) owns it behind a
//! mutex together with the in-flight markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One fetched resource and the time it was stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Resource identifier (e.g. "/people")
    #[serde(skip)]
    pub key: String,
    /// The parsed response body
    #[serde(rename = "data")]
    pub value: Value,
    /// When the value was written
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: Value, stored_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value,
            stored_at,
        }
    }
}

/// Mapping from resource identifier to [`CacheEntry`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
}

impl CacheStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the entry for `key`
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Writes `value` under `key`, replacing any existing entry
    pub fn put(&mut self, key: &str, value: Value, stored_at: DateTime<Utc>) {
        self.entries
            .insert(key.to_string(), CacheEntry::new(key, value, stored_at));
    }

    /// Replaces the whole content of the store with `entries`
    ///
    /// Nothing from the previous content survives, even for keys that are
    /// absent from `entries`.
    pub fn replace_all(&mut self, entries: impl IntoIterator<Item = CacheEntry>) {
        self.entries = entries
            .into_iter()
            .map(|entry| (entry.key.clone(), entry))
            .collect();
    }

    /// Removes every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates over all entries in no particular order
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
