//! Storage trait definitions for Engram
//!
//! `MemoryStore` is the single persistence seam the pipelines depend on.
//! It is async and backend-agnostic; an in-memory fake is provided for
//! testing via the `fakes` module and a SurrealDB backend via
//! `surreal_store`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::schema::{MemoryEntry, MemoryKind};

/// Filter for `query` and `delete`.
///
/// All fields are conjunctive; an empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    /// Restrict to these kinds (None = all kinds).
    pub kinds: Option<Vec<MemoryKind>>,
    /// Restrict to Working entries bound to this task.
    pub task_id: Option<String>,
    /// Only entries created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Only entries created at or before this instant.
    pub created_before: Option<DateTime<Utc>>,
}

impl EntryFilter {
    /// Filter that matches all entries.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_kinds(mut self, kinds: Vec<MemoryKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn with_kind(self, kind: MemoryKind) -> Self {
        self.with_kinds(vec![kind])
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn created_after(mut self, after: DateTime<Utc>) -> Self {
        self.created_after = Some(after);
        self
    }

    pub fn created_before(mut self, before: DateTime<Utc>) -> Self {
        self.created_before = Some(before);
        self
    }

    /// Whether an entry matches this filter.
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&entry.kind) {
                return false;
            }
        }
        if let Some(ref task_id) = self.task_id {
            if entry.context.task_id.as_deref() != Some(task_id.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if entry.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if entry.created_at > before {
                return false;
            }
        }
        true
    }
}

/// Persistent memory store.
///
/// Guarantees:
/// - `insert` fails with `StorageError::DuplicateEntry` when the entry id or
///   the `(kind, content_digest)` pair already exists. This constraint, not
///   application locking, resolves concurrent near-duplicate admissions.
/// - `query` returns matching entries in unspecified order; callers sort.
/// - `update_usage` increments `usage_count` and sets `last_used_at`.
/// - `delete` removes every matching entry and reports the count (used for
///   Working-memory hard deletion on task completion).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist a new entry, returning its id.
    async fn insert(&self, entry: &MemoryEntry) -> StorageResult<String>;

    /// Fetch entries matching the filter.
    async fn query(&self, filter: &EntryFilter) -> StorageResult<Vec<MemoryEntry>>;

    /// Record a retrieval: bump `usage_count`, touch `last_used_at`.
    async fn update_usage(&self, id: &str, used_at: DateTime<Utc>) -> StorageResult<()>;

    /// Hard-delete every entry matching the filter, returning the count.
    async fn delete(&self, filter: &EntryFilter) -> StorageResult<u64>;
}
