//! Admission pipeline: validate, filter, review, gate, dedup, persist.
//!
//! A candidate moves through the stages in cost order, cheapest first, and
//! the first stage that rejects ends the run. Rejections are data, not
//! errors: the receipt says what happened and why, and only infrastructure
//! failures surface as `MemoryError`.

use std::sync::Arc;

use engram_state::{EntryContext, EntryFilter, MemoryEntry, MemoryKind, MemoryStore, StorageError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MemoryConfig;
use crate::consensus::{ConsensusResult, ReviewPanel, ReviewRequest};
use crate::error::MemoryResult;
use crate::filter::{TrivialFilter, TrivialVerdict};
use crate::model::{self, FieldError};
use crate::scoring::SimilarityScorer;

/// A candidate memory submitted for admission.
#[derive(Debug, Clone)]
pub struct StorageRequest {
    pub content: String,
    /// Kind, when the caller already knows it; classified otherwise.
    pub kind: Option<MemoryKind>,
    pub context: EntryContext,
    /// Explicit confidence. Mandatory for Semantic entries.
    pub confidence: Option<f64>,
}

impl StorageRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: None,
            context: EntryContext::new(),
            confidence: None,
        }
    }

    pub fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_context(mut self, context: EntryContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Why a candidate was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// Required fields for the entry's kind were missing or invalid.
    ValidationFailed,
    /// A triviality rule matched.
    Trivial,
    /// Too few reviewers responded; the gate fails safe.
    DegradedConsensus,
    /// The panel responded but the average did not clear the gate.
    BelowThreshold,
    /// Similar same-kind content is already persisted.
    Duplicate,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ValidationFailed => "validation-failed",
            Self::Trivial => "trivial",
            Self::DegradedConsensus => "degraded-consensus",
            Self::BelowThreshold => "below-threshold",
            Self::Duplicate => "duplicate",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one admission attempt.
#[derive(Debug, Clone)]
pub struct StoreReceipt {
    pub accepted: bool,
    /// Persisted entry id, on acceptance.
    pub id: Option<String>,
    /// Kind the entry was stored (or would have been stored) under.
    pub kind: MemoryKind,
    pub reason: Option<RejectReason>,
    /// Populated for validation rejections.
    pub field_errors: Vec<FieldError>,
    /// Populated when the filter fired.
    pub trivial: Option<TrivialVerdict>,
    /// Populated once the panel has run.
    pub consensus: Option<ConsensusResult>,
}

impl StoreReceipt {
    fn rejected(kind: MemoryKind, reason: RejectReason) -> Self {
        Self {
            accepted: false,
            id: None,
            kind,
            reason: Some(reason),
            field_errors: Vec::new(),
            trivial: None,
            consensus: None,
        }
    }
}

/// The admission pipeline. One instance per coordinator; stateless between
/// calls apart from the store behind it.
pub struct StoragePipeline {
    store: Arc<dyn MemoryStore>,
    filter: TrivialFilter,
    panel: ReviewPanel,
    similarity: Arc<dyn SimilarityScorer>,
    config: MemoryConfig,
}

impl StoragePipeline {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        filter: TrivialFilter,
        panel: ReviewPanel,
        similarity: Arc<dyn SimilarityScorer>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            filter,
            panel,
            similarity,
            config,
        }
    }

    /// Run a candidate through the full admission pipeline.
    pub async fn store(&self, request: StorageRequest) -> MemoryResult<StoreReceipt> {
        let kind = request
            .kind
            .unwrap_or_else(|| model::classify(&request.content, &request.context));

        let mut entry = MemoryEntry::new(kind, request.content, request.context);
        entry.confidence = request.confidence;

        // Validation first: the cheapest rejection, before any reviewer runs.
        let field_errors = model::validate(&entry);
        if !field_errors.is_empty() {
            debug!(kind = %kind, errors = field_errors.len(), "candidate failed validation");
            return Ok(StoreReceipt {
                field_errors,
                ..StoreReceipt::rejected(kind, RejectReason::ValidationFailed)
            });
        }

        let verdict = self.filter.evaluate(&entry.content, &entry.context);
        if verdict.trivial {
            debug!(kind = %kind, rule = ?verdict.rule, "candidate filtered as trivial");
            return Ok(StoreReceipt {
                trivial: Some(verdict),
                ..StoreReceipt::rejected(kind, RejectReason::Trivial)
            });
        }

        let consensus = self
            .panel
            .review(ReviewRequest {
                content: entry.content.clone(),
                kind,
                context: entry.context.clone(),
            })
            .await;

        if consensus.degraded {
            info!(
                kind = %kind,
                responders = consensus.responders(),
                "rejected: consensus degraded"
            );
            return Ok(StoreReceipt {
                consensus: Some(consensus),
                ..StoreReceipt::rejected(kind, RejectReason::DegradedConsensus)
            });
        }
        if !consensus.passes(self.config.quality_gate_threshold) {
            info!(
                kind = %kind,
                avg_score = consensus.avg_score,
                threshold = self.config.quality_gate_threshold,
                "rejected: below quality gate"
            );
            return Ok(StoreReceipt {
                consensus: Some(consensus),
                ..StoreReceipt::rejected(kind, RejectReason::BelowThreshold)
            });
        }

        if self.is_duplicate(&entry).await? {
            info!(kind = %kind, digest = entry.content_digest.short(), "rejected: duplicate");
            return Ok(StoreReceipt {
                consensus: Some(consensus),
                ..StoreReceipt::rejected(kind, RejectReason::Duplicate)
            });
        }

        match self.store.insert(&entry).await {
            Ok(id) => {
                info!(entry_id = %id, kind = %kind, avg_score = consensus.avg_score, "memory persisted");
                Ok(StoreReceipt {
                    accepted: true,
                    id: Some(id),
                    kind,
                    reason: None,
                    field_errors: Vec::new(),
                    trivial: None,
                    consensus: Some(consensus),
                })
            }
            // A racing admission won between our check and the insert; the
            // store's uniqueness constraint makes the loser a rejection.
            Err(e) if e.is_duplicate() => {
                info!(kind = %kind, "rejected: lost duplicate race");
                Ok(StoreReceipt {
                    consensus: Some(consensus),
                    ..StoreReceipt::rejected(kind, RejectReason::Duplicate)
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Similarity check against persisted entries of the same kind only;
    /// the same text can legitimately exist as both a fact and an event.
    async fn is_duplicate(&self, entry: &MemoryEntry) -> Result<bool, StorageError> {
        let existing = self
            .store
            .query(&EntryFilter::all().with_kind(entry.kind))
            .await?;

        for other in &existing {
            let score = self.similarity.score(&entry.content, &other.content);
            if score >= self.config.duplicate_cutoff {
                debug!(
                    against = %other.id,
                    score,
                    cutoff = self.config.duplicate_cutoff,
                    "duplicate match"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use engram_state::InMemoryStore;

    use super::*;
    use crate::consensus::{PanelConfig, ReviewError, ReviewVote, Reviewer};
    use crate::scoring::TokenOverlapScorer;

    struct FixedReviewer(u8);

    #[async_trait]
    impl Reviewer for FixedReviewer {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn review(&self, _request: &ReviewRequest) -> Result<ReviewVote, ReviewError> {
            Ok(ReviewVote {
                score: self.0,
                rationale: "fixed score".to_string(),
                confidence: None,
            })
        }
    }

    fn pipeline_scoring(scores: &[u8]) -> (Arc<InMemoryStore>, StoragePipeline) {
        let store = Arc::new(InMemoryStore::new());
        let reviewers = scores
            .iter()
            .map(|&s| Arc::new(FixedReviewer(s)) as Arc<dyn Reviewer>)
            .collect();
        let panel = ReviewPanel::new(
            reviewers,
            PanelConfig {
                timeout: Duration::from_millis(100),
                weight_by_confidence: false,
                disagreement_variance: 100.0,
            },
        );
        let pipeline = StoragePipeline::new(
            store.clone(),
            TrivialFilter::with_default_rules(),
            panel,
            Arc::new(TokenOverlapScorer),
            MemoryConfig::default(),
        );
        (store, pipeline)
    }

    fn procedural(content: &str) -> StorageRequest {
        StorageRequest::new(content)
            .with_kind(MemoryKind::Procedural)
            .with_context(EntryContext::new().with_procedure(content))
    }

    #[tokio::test]
    async fn test_accepted_entry_is_persisted() {
        let (store, pipeline) = pipeline_scoring(&[7, 8, 6]);
        let receipt = pipeline
            .store(procedural("run migrations before restarting the workers"))
            .await
            .unwrap();
        assert!(receipt.accepted);
        assert!(receipt.id.is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_gate_rejects_at_threshold_exactly() {
        // avg 4.0 does not exceed 4.0
        let (store, pipeline) = pipeline_scoring(&[4, 4, 4]);
        let receipt = pipeline
            .store(procedural("rotate credentials before the cutover"))
            .await
            .unwrap();
        assert!(!receipt.accepted);
        assert_eq!(receipt.reason, Some(RejectReason::BelowThreshold));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_review() {
        let (store, pipeline) = pipeline_scoring(&[10, 10, 10]);
        let receipt = pipeline
            .store(StorageRequest::new("fact with no concept").with_kind(MemoryKind::Semantic))
            .await
            .unwrap();
        assert_eq!(receipt.reason, Some(RejectReason::ValidationFailed));
        assert!(!receipt.field_errors.is_empty());
        assert!(receipt.consensus.is_none(), "panel must not have run");
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_unclassified_request_gets_classified() {
        let (_, pipeline) = pipeline_scoring(&[8]);
        let receipt = pipeline
            .store(
                StorageRequest::new("the staging cluster shares its database")
                    .with_context(EntryContext::new().with_concept("staging"))
                    .with_confidence(0.8),
            )
            .await
            .unwrap();
        assert_eq!(receipt.kind, MemoryKind::Semantic);
        assert!(receipt.accepted);
    }

    #[tokio::test]
    async fn test_duplicate_content_rejected() {
        let (store, pipeline) = pipeline_scoring(&[8, 8, 8]);
        let first = pipeline
            .store(procedural("clear the target directory before profiling"))
            .await
            .unwrap();
        assert!(first.accepted);

        let second = pipeline
            .store(procedural("Clear the target directory before profiling."))
            .await
            .unwrap();
        assert!(!second.accepted);
        assert_eq!(second.reason, Some(RejectReason::Duplicate));
        assert_eq!(store.len(), 1);
    }
}
