//! SurrealDB-backed MemoryStore implementation
//!
//! Uses `schema::MemoryEntryRecord` for persistence, converting to/from the
//! domain `MemoryEntry` at the boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::migrations;
use crate::schema::{MemoryEntry, MemoryEntryRecord};
use crate::storage_traits::{EntryFilter, MemoryStore};

/// SurrealDB-backed implementation of [`MemoryStore`].
pub struct SurrealMemoryStore {
    db: Surreal<Any>,
}

impl SurrealMemoryStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `engram/main`, and runs `init_schema`.
    pub async fn in_memory() -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect("mem://")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        db.use_ns("engram")
            .use_db("main")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealMemoryStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Connects to `SURREALDB_URL` when set; otherwise falls back to local
    /// persistence under `.engram/db`.
    pub async fn from_env() -> StorageResult<Self> {
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            let db = surrealdb::engine::any::connect(&url)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;

            db.use_ns("engram")
                .use_db("main")
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;

            migrations::init_schema(&db).await?;
            info!("SurrealMemoryStore connected ({})", url);
            return Ok(Self { db });
        }

        let path = ".engram/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StorageError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
        let url = format!("surrealkv://{}", path);
        info!("No SURREALDB_URL found, using local persistence: {}", url);

        let db = surrealdb::engine::any::connect(&url)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns("engram")
            .use_db("main")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    /// Fetch a row by entry id, or EntryNotFound.
    async fn fetch_row(&self, id: &str) -> StorageResult<MemoryEntryRecord> {
        let id_owned = id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM memories WHERE entry_id = $eid")
            .bind(("eid", id_owned))
            .await?;

        let rows: Vec<MemoryEntryRecord> =
            res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::EntryNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl MemoryStore for SurrealMemoryStore {
    async fn insert(&self, entry: &MemoryEntry) -> StorageResult<String> {
        let row = MemoryEntryRecord::from_entry(entry);

        debug!(entry_id = %entry.id, kind = %entry.kind, "inserting memory entry");

        let _created: Option<MemoryEntryRecord> =
            self.db.create("memories").content(row).await?;

        Ok(entry.id.clone())
    }

    async fn query(&self, filter: &EntryFilter) -> StorageResult<Vec<MemoryEntry>> {
        // Kinds are pushed down; time range and task id are applied through
        // the shared `EntryFilter::matches` so both backends agree exactly.
        let rows: Vec<MemoryEntryRecord> = if let Some(ref kinds) = filter.kinds {
            let kind_strs: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
            let mut res = self
                .db
                .query("SELECT * FROM memories WHERE kind IN $kinds")
                .bind(("kinds", kind_strs))
                .await?;
            res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            let mut res = self.db.query("SELECT * FROM memories").await?;
            res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?
        };

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = row.into_entry()?;
            if filter.matches(&entry) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn update_usage(&self, id: &str, used_at: DateTime<Utc>) -> StorageResult<()> {
        // Existence check first so a miss is EntryNotFound, not a no-op.
        self.fetch_row(id).await?;

        let id_owned = id.to_string();
        self.db
            .query(
                "UPDATE memories SET usage_count += 1, last_used_at = $used_at \
                 WHERE entry_id = $eid",
            )
            .bind(("used_at", surrealdb::sql::Datetime::from(used_at)))
            .bind(("eid", id_owned))
            .await?;

        Ok(())
    }

    async fn delete(&self, filter: &EntryFilter) -> StorageResult<u64> {
        // Resolve matching ids via the shared filter, then delete by id so
        // both backends implement identical delete semantics.
        let matching = self.query(filter).await?;
        let ids: Vec<String> = matching.into_iter().map(|e| e.id).collect();
        let count = ids.len() as u64;

        if !ids.is_empty() {
            self.db
                .query("DELETE FROM memories WHERE entry_id IN $ids")
                .bind(("ids", ids))
                .await?;
        }

        debug!(removed = count, "deleted memory entries");
        Ok(count)
    }
}
