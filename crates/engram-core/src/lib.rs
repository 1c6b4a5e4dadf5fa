//! Engram-Core: memory pipelines for agent sessions.
//!
//! Sits on top of `engram-state` (Layer 0, persistence) and implements the
//! decision-making half of the memory layer:
//!
//! - **Admission**: kind classification and validation, the trivial-content
//!   filter, multi-reviewer consensus with a fail-safe quality gate, and
//!   similarity-based duplicate rejection.
//! - **Retrieval**: blended keyword/semantic relevance, deterministic
//!   ranking, greedy token budgeting, and context-block assembly.
//!
//! Hosts interact through [`MemoryCoordinator`]; everything else is exported
//! for callers that need to compose the pieces differently.

pub mod budget;
pub mod config;
pub mod consensus;
pub mod coordinator;
mod error;
pub mod filter;
pub mod model;
pub mod retrieval;
pub mod scoring;
pub mod storage_pipeline;
pub mod telemetry;

pub use budget::{allocate, estimate_tokens, Allocation};
pub use config::{KindPriorities, MemoryConfig};
pub use consensus::{
    AttributedFailure, AttributedVote, ConsensusResult, PanelConfig, ReviewError, ReviewPanel,
    ReviewRequest, ReviewVote, Reviewer,
};
pub use coordinator::MemoryCoordinator;
pub use error::{MemoryError, MemoryResult};
pub use filter::{TrivialFilter, TrivialRule, TrivialVerdict};
pub use model::{classify, validate, FieldError};
pub use retrieval::{RetrievalPipeline, RetrievalQuery, RetrievalResult, RetrievedEntry};
pub use scoring::{keyword_score, SimilarityScorer, TokenOverlapScorer};
pub use storage_pipeline::{RejectReason, StoragePipeline, StorageRequest, StoreReceipt};
pub use telemetry::init_tracing;

// Re-export the persisted domain types so hosts need only this crate.
pub use engram_state::{
    ContentDigest, EntryContext, EntryFilter, InMemoryStore, MemoryEntry, MemoryKind, MemoryStore,
    StorageError, SurrealMemoryStore,
};
