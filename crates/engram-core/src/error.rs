//! Error types for the core memory pipelines.
//!
//! A request that the pipeline *rejects* (trivial content, failed quality
//! gate, duplicate) is not an error: it comes back as a `StoreReceipt` with a
//! `RejectReason`. `MemoryError` covers the true exceptions only.

use engram_state::StorageError;
use thiserror::Error;

/// Errors surfaced by the memory coordinator and its pipelines.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The caller's query is malformed (e.g. empty query text).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The persistence layer failed. Duplicate-insert failures are mapped to
    /// a rejection before reaching this variant.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),
}

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
