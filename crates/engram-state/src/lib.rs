//! Engram-State: SurrealDB Backend for Engram
//!
//! This crate provides the persistence layer for the agent memory system.
//! It handles all I/O with SurrealDB, exposing a single backend-agnostic
//! `MemoryStore` trait the pipelines depend on.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Data integrity and the uniqueness constraints that resolve
//! concurrent near-duplicate admissions.
//!
//! ## Key Components
//!
//! - `MemoryStore`: the async storage seam (insert/query/update_usage/delete)
//! - `MemoryEntry` / `MemoryKind` / `EntryContext`: the persisted domain types
//! - `SurrealMemoryStore`: SurrealDB implementation (mem:// for tests)
//! - `InMemoryStore`: dependency-free fake satisfying the same contract

mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StorageError, StorageResult};
pub use fakes::InMemoryStore;
pub use schema::{ContentDigest, EntryContext, MemoryEntry, MemoryEntryRecord, MemoryKind};
pub use storage_traits::{EntryFilter, MemoryStore};
pub use surreal_store::SurrealMemoryStore;
