//! In-Memory Snapshot Store
//!
//! Process-local store used by tests and as the development fallback when no
//! Redis URL is configured. Contents are lost on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{Fields, SnapshotStore, StoreError};

#[derive(Debug, Clone)]
enum Entry {
    Hash(Fields),
    Str(String),
}

/// Snapshot store backed by a `HashMap` behind a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write operations accepted so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn set_fields(&self, key: &str, fields: &Fields) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.write();
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::Hash(Fields::new()));
            match entry {
                Entry::Hash(existing) => {
                    existing.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Entry::Str(_) => {
                    return Err(StoreError::Command(format!(
                        "WRONGTYPE key {key} holds a string value"
                    )));
                }
            }
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn get_fields(&self, key: &str) -> Result<Fields, StoreError> {
        match self.entries.read().get(key) {
            Some(Entry::Hash(fields)) => Ok(fields.clone()),
            Some(Entry::Str(_)) => Err(StoreError::Command(format!(
                "WRONGTYPE key {key} holds a string value"
            ))),
            None => Ok(Fields::new()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entries.read().get(key) {
            Some(Entry::Str(value)) => Ok(Some(value.clone())),
            Some(Entry::Hash(_)) => Err(StoreError::Command(format!(
                "WRONGTYPE key {key} holds a hash value"
            ))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert(key.to_string(), Entry::Str(value.to_string()));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
