//! In-memory fake for the storage trait (testing and embedding)
//!
//! Provides `InMemoryStore`, which satisfies the `MemoryStore` contract —
//! including both uniqueness constraints — without any external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{StorageError, StorageResult};
use crate::schema::MemoryEntry;
use crate::storage_traits::{EntryFilter, MemoryStore};

/// In-memory store backed by a `HashMap<entry_id, MemoryEntry>`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn insert(&self, entry: &MemoryEntry) -> StorageResult<String> {
        let mut entries = self.entries.lock().unwrap();

        if entries.contains_key(&entry.id) {
            return Err(StorageError::DuplicateEntry {
                detail: format!("entry id already exists: {}", entry.id),
            });
        }
        if entries
            .values()
            .any(|e| e.kind == entry.kind && e.content_digest == entry.content_digest)
        {
            return Err(StorageError::DuplicateEntry {
                detail: format!(
                    "content digest already exists for kind {}: {}",
                    entry.kind,
                    entry.content_digest.short()
                ),
            });
        }

        entries.insert(entry.id.clone(), entry.clone());
        Ok(entry.id.clone())
    }

    async fn query(&self, filter: &EntryFilter) -> StorageResult<Vec<MemoryEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn update_usage(&self, id: &str, used_at: DateTime<Utc>) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| StorageError::EntryNotFound { id: id.to_string() })?;
        entry.usage_count += 1;
        entry.last_used_at = used_at;
        Ok(())
    }

    async fn delete(&self, filter: &EntryFilter) -> StorageResult<u64> {
        let mut entries = self.entries.lock().unwrap();
        let doomed: Vec<String> = entries
            .values()
            .filter(|e| filter.matches(e))
            .map(|e| e.id.clone())
            .collect();
        for id in &doomed {
            entries.remove(id);
        }
        Ok(doomed.len() as u64)
    }
}
