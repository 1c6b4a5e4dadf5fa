//! SurrealDB schema migrations and initialization
//!
//! Sets up the `memories` table with the constraints the pipelines rely on.
//! Safe to call multiple times (idempotent).

use crate::error::{StorageError, StorageResult};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Engram tables in SurrealDB.
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing Engram SurrealDB schema");
    init_memories_table(db).await?;
    info!("Engram schema initialization complete");
    Ok(())
}

/// Initialize `memories` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE memories {
///   entry_id:        STRING (primary key, unique)
///   kind:            STRING (enum: episodic | semantic | prospective | procedural | working)
///   content:         STRING
///   context:         OBJECT (session, tags, kind-specific fields)
///   confidence:      FLOAT in [0,1]
///   content_digest:  STRING (unique together with kind)
///   task_id:         STRING? (Working entries only, indexed for deletes)
///   usage_count:     INT
///   created_at:      DATETIME (indexed)
///   last_used_at:    DATETIME
/// }
/// ```
///
/// Constraints:
/// - `entry_id` is unique (id assignment happens exactly once, at admission)
/// - `(kind, content_digest)` is unique — this index, not application
///   locking, decides the loser of a concurrent near-duplicate admission
async fn init_memories_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing memories table");

    let sql = r#"
        DEFINE TABLE memories
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        -- Ensure entry_id is unique
        DEFINE INDEX idx_entry_id ON TABLE memories COLUMNS entry_id UNIQUE;

        -- Same-kind near-duplicates collapse to the same digest; the unique
        -- index rejects the second insert
        DEFINE INDEX idx_kind_digest ON TABLE memories COLUMNS kind, content_digest UNIQUE;

        -- Index kind for type-filtered retrieval
        DEFINE INDEX idx_kind ON TABLE memories COLUMNS kind;

        -- Index task_id for Working-memory hard deletion
        DEFINE INDEX idx_task_id ON TABLE memories COLUMNS task_id;

        -- Index created_at for time-range queries
        DEFINE INDEX idx_created_at ON TABLE memories COLUMNS created_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    info!("✓ memories table initialized");
    Ok(())
}
