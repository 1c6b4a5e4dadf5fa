//! The public entry point hosts interact with.
//!
//! `MemoryCoordinator` wires the admission and retrieval pipelines to one
//! store and exposes the three operations: store a candidate, retrieve
//! context for a query, and clear a completed task's working memory.

use std::sync::Arc;

use engram_state::{EntryFilter, MemoryKind, MemoryStore};
use tracing::info;

use crate::config::MemoryConfig;
use crate::consensus::{PanelConfig, ReviewPanel, Reviewer};
use crate::error::MemoryResult;
use crate::filter::TrivialFilter;
use crate::retrieval::{RetrievalPipeline, RetrievalQuery, RetrievalResult};
use crate::scoring::{SimilarityScorer, TokenOverlapScorer};
use crate::storage_pipeline::{StoragePipeline, StorageRequest, StoreReceipt};

/// Facade over the memory layer. Cheap to clone behind an `Arc`; one
/// instance serves all of a host's agent sessions.
pub struct MemoryCoordinator {
    store: Arc<dyn MemoryStore>,
    storage: StoragePipeline,
    retrieval: RetrievalPipeline,
}

impl MemoryCoordinator {
    /// Build a coordinator with the default filter and similarity scorer.
    pub fn new(
        store: Arc<dyn MemoryStore>,
        reviewers: Vec<Arc<dyn Reviewer>>,
        config: MemoryConfig,
    ) -> Self {
        Self::with_similarity(store, reviewers, Arc::new(TokenOverlapScorer), config)
    }

    /// Build a coordinator with a custom similarity scorer (e.g. one backed
    /// by an embedding service).
    pub fn with_similarity(
        store: Arc<dyn MemoryStore>,
        reviewers: Vec<Arc<dyn Reviewer>>,
        similarity: Arc<dyn SimilarityScorer>,
        config: MemoryConfig,
    ) -> Self {
        let panel = ReviewPanel::new(
            reviewers,
            PanelConfig {
                timeout: config.reviewer_timeout,
                weight_by_confidence: config.weight_by_confidence,
                disagreement_variance: config.disagreement_variance,
            },
        );
        let storage = StoragePipeline::new(
            Arc::clone(&store),
            TrivialFilter::with_default_rules(),
            panel,
            Arc::clone(&similarity),
            config.clone(),
        );
        let retrieval = RetrievalPipeline::new(Arc::clone(&store), similarity, config);

        Self {
            store,
            storage,
            retrieval,
        }
    }

    /// Submit a candidate memory for admission.
    pub async fn store(&self, request: StorageRequest) -> MemoryResult<StoreReceipt> {
        self.storage.store(request).await
    }

    /// Retrieve budgeted, ranked context for a query.
    pub async fn retrieve(&self, query: &RetrievalQuery) -> MemoryResult<RetrievalResult> {
        self.retrieval.retrieve(query).await
    }

    /// Hard-delete all working memory scoped to a finished task.
    /// Returns the number of entries removed.
    pub async fn clear_task(&self, task_id: &str) -> MemoryResult<u64> {
        let removed = self
            .store
            .delete(
                &EntryFilter::all()
                    .with_kind(MemoryKind::Working)
                    .with_task_id(task_id),
            )
            .await?;
        info!(task_id, removed, "working memory cleared");
        Ok(removed)
    }
}
