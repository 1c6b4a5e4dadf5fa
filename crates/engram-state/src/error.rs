//! Error types for engram-state

use thiserror::Error;

/// Errors that can occur in the memory persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Backend query/write error
    #[error("Storage backend failed: {0}")]
    Backend(String),

    /// Uniqueness violation on entry id or (kind, content_digest)
    #[error("Duplicate entry: {detail}")]
    DuplicateEntry { detail: String },

    /// Entry lookup miss
    #[error("Entry not found: {id}")]
    EntryNotFound { id: String },

    /// Digest string failed validation
    #[error("Invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl StorageError {
    /// Whether this error is the loser's side of a duplicate-insert race.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StorageError::DuplicateEntry { .. })
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        let msg = err.to_string();
        // SurrealDB reports unique index violations through the generic query
        // error; classify them so callers can treat the race as a duplicate.
        if msg.contains("already contains") || (msg.contains("idx_") && msg.contains("unique")) {
            StorageError::DuplicateEntry { detail: msg }
        } else {
            StorageError::Backend(msg)
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;
