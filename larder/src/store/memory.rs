//! In-memory record store.
//!
//! A concurrent map from canonical key to [`Record`]. Reads clone the
//! record out, so concurrent readers of the same key always observe the
//! same payload bytes until a write or eviction replaces the entry.

use dashmap::DashMap;

use crate::record::Record;

/// Concurrent map layer of the cache.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Record>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a record by canonical key.
    pub fn get(&self, key: &str) -> Option<Record> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Insert or replace a record.
    pub fn put(&self, key: String, record: Record) {
        self.entries.insert(key, record);
    }

    /// Remove a record. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every record whose canonical key starts with `prefix`.
    /// Returns the removed keys.
    pub fn remove_by_prefix(&self, prefix: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|key, _| {
            if key.starts_with(prefix) {
                removed.push(key.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
