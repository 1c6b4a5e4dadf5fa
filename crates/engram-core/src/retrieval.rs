//! Retrieval pipeline: fetch, score, rank, budget, format.
//!
//! Relevance blends keyword overlap with the pluggable semantic signal.
//! Ranking is fully deterministic: ties break by recency of use, then kind
//! priority, then entry id. Malformed rows are logged and skipped rather
//! than failing the whole retrieval.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use engram_state::{EntryFilter, MemoryEntry, MemoryKind, MemoryStore};
use tracing::{debug, info, warn};

use crate::budget::{self, estimate_tokens};
use crate::config::MemoryConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::model;
use crate::scoring::{keyword_score, SimilarityScorer};

/// A retrieval request.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub query_text: String,
    /// Restrict to these kinds; `None` means all kinds.
    pub kinds: Option<Vec<MemoryKind>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Token budget for the assembled context. `None` uses the configured
    /// default; zero or negative yields an empty result.
    pub token_budget: Option<i64>,
}

impl RetrievalQuery {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            kinds: None,
            created_after: None,
            created_before: None,
            token_budget: None,
        }
    }

    pub fn with_kinds(mut self, kinds: Vec<MemoryKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn with_token_budget(mut self, budget: i64) -> Self {
        self.token_budget = Some(budget);
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }
}

/// One selected entry with its scoring and cost.
#[derive(Debug, Clone)]
pub struct RetrievedEntry {
    pub entry: MemoryEntry,
    pub relevance: f64,
    pub tokens: usize,
}

/// The assembled result.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Selected entries in rank order.
    pub entries: Vec<RetrievedEntry>,
    /// Total tokens consumed; never exceeds the budget.
    pub tokens_used: usize,
    /// Context block ready to hand to an agent, grouped by kind.
    pub context_block: String,
}

impl RetrievalResult {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            tokens_used: 0,
            context_block: String::new(),
        }
    }
}

/// The retrieval pipeline.
pub struct RetrievalPipeline {
    store: Arc<dyn MemoryStore>,
    similarity: Arc<dyn SimilarityScorer>,
    config: MemoryConfig,
}

impl RetrievalPipeline {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        similarity: Arc<dyn SimilarityScorer>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            similarity,
            config,
        }
    }

    pub async fn retrieve(&self, query: &RetrievalQuery) -> MemoryResult<RetrievalResult> {
        if query.query_text.trim().is_empty() {
            return Err(MemoryError::InvalidQuery("empty query text".to_string()));
        }

        let budget = query.token_budget.unwrap_or(self.config.default_token_budget);
        if budget <= 0 {
            debug!(budget, "non-positive token budget, returning empty result");
            return Ok(RetrievalResult::empty());
        }

        let mut filter = EntryFilter::all();
        if let Some(ref kinds) = query.kinds {
            filter = filter.with_kinds(kinds.clone());
        }
        if let Some(after) = query.created_after {
            filter = filter.created_after(after);
        }
        if let Some(before) = query.created_before {
            filter = filter.created_before(before);
        }

        let fetched = self.store.query(&filter).await?;
        let candidates = self.score(&query.query_text, fetched);

        let ranked: Vec<(RetrievedEntry, usize)> = candidates
            .into_iter()
            .map(|c| {
                let tokens = c.tokens;
                (c, tokens)
            })
            .collect();
        let allocation = budget::allocate(ranked, budget, self.config.budget_warn_ratio);

        let entries: Vec<RetrievedEntry> =
            allocation.selected.into_iter().map(|(c, _)| c).collect();
        let context_block = render_context_block(&entries);

        // Usage bookkeeping strengthens future ranking; a failure here is
        // logged but does not void an otherwise good retrieval.
        let now = Utc::now();
        for retrieved in &entries {
            if let Err(e) = self.store.update_usage(&retrieved.entry.id, now).await {
                warn!(entry_id = %retrieved.entry.id, error = %e, "usage update failed");
            }
        }

        info!(
            returned = entries.len(),
            skipped = allocation.skipped,
            tokens_used = allocation.tokens_used,
            budget,
            "retrieval complete"
        );

        Ok(RetrievalResult {
            entries,
            tokens_used: allocation.tokens_used,
            context_block,
        })
    }

    /// Score, drop malformed rows, and sort into final rank order.
    fn score(&self, query_text: &str, fetched: Vec<MemoryEntry>) -> Vec<RetrievedEntry> {
        let mut scored: Vec<RetrievedEntry> = fetched
            .into_iter()
            .filter(|entry| {
                let errors = model::validate(entry);
                if errors.is_empty() {
                    true
                } else {
                    warn!(entry_id = %entry.id, ?errors, "skipping malformed entry");
                    false
                }
            })
            .map(|entry| {
                let kw = keyword_score(query_text, &entry.content);
                let sem = self.similarity.score(query_text, &entry.content);
                let relevance =
                    self.config.keyword_weight * kw + self.config.semantic_weight * sem;
                let tokens = estimate_tokens(&render_entry(&entry));
                RetrievedEntry {
                    entry,
                    relevance,
                    tokens,
                }
            })
            .collect();

        let priorities = self.config.kind_priorities;
        scored.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.entry.last_used_at.cmp(&a.entry.last_used_at))
                .then_with(|| {
                    priorities
                        .for_kind(b.entry.kind)
                        .partial_cmp(&priorities.for_kind(a.entry.kind))
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        scored
    }
}

/// Render one entry the way it appears in the context block.
fn render_entry(entry: &MemoryEntry) -> String {
    let mut line = format!("- {}", entry.content.trim());
    if entry.kind == MemoryKind::Procedural && entry.usage_count > 0 {
        line.push_str(&format!(" (used {} times)", entry.usage_count));
    }
    line
}

/// Assemble the labeled context block: entries grouped under a heading per
/// kind, groups in tie-break priority order, rank order within each group.
fn render_context_block(entries: &[RetrievedEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut ordered_kinds: Vec<MemoryKind> = vec![
        MemoryKind::Procedural,
        MemoryKind::Semantic,
        MemoryKind::Prospective,
        MemoryKind::Working,
        MemoryKind::Episodic,
    ];
    ordered_kinds.retain(|k| entries.iter().any(|e| e.entry.kind == *k));

    let mut block = String::from("## Relevant memory\n");
    for kind in ordered_kinds {
        block.push_str(&format!("\n### {}\n", heading(kind)));
        for retrieved in entries.iter().filter(|e| e.entry.kind == kind) {
            block.push_str(&render_entry(&retrieved.entry));
            block.push('\n');
        }
    }
    block
}

fn heading(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::Episodic => "Past events",
        MemoryKind::Semantic => "Known facts",
        MemoryKind::Prospective => "Pending intentions",
        MemoryKind::Procedural => "Proven procedures",
        MemoryKind::Working => "Task notes",
    }
}

#[cfg(test)]
mod tests {
    use engram_state::{EntryContext, InMemoryStore};

    use super::*;
    use crate::scoring::TokenOverlapScorer;

    fn pipeline(store: Arc<InMemoryStore>) -> RetrievalPipeline {
        RetrievalPipeline::new(store, Arc::new(TokenOverlapScorer), MemoryConfig::default())
    }

    fn procedural_entry(content: &str) -> MemoryEntry {
        MemoryEntry::new(
            MemoryKind::Procedural,
            content,
            EntryContext::new().with_procedure(content),
        )
    }

    fn semantic_entry(content: &str, concept: &str) -> MemoryEntry {
        MemoryEntry::new(
            MemoryKind::Semantic,
            content,
            EntryContext::new().with_concept(concept),
        )
        .with_confidence(0.9)
    }

    #[tokio::test]
    async fn test_empty_query_text_is_invalid() {
        let store = Arc::new(InMemoryStore::new());
        let err = pipeline(store)
            .retrieve(&RetrievalQuery::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_zero_budget_returns_empty() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(&procedural_entry("pin the toolchain before bisecting"))
            .await
            .unwrap();

        let result = pipeline(store)
            .retrieve(&RetrievalQuery::new("toolchain").with_token_budget(0))
            .await
            .unwrap();
        assert!(result.entries.is_empty());
        assert_eq!(result.tokens_used, 0);
        assert!(result.context_block.is_empty());
    }

    #[tokio::test]
    async fn test_relevant_entry_ranks_first() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(&procedural_entry("restart the indexer after schema changes"))
            .await
            .unwrap();
        store
            .insert(&semantic_entry("lunch is at noon on fridays", "lunch"))
            .await
            .unwrap();

        let result = pipeline(store)
            .retrieve(&RetrievalQuery::new("indexer schema changes"))
            .await
            .unwrap();
        assert_eq!(result.entries.len(), 2);
        assert!(result.entries[0].entry.content.contains("indexer"));
        assert!(result.entries[0].relevance > result.entries[1].relevance);
    }

    #[tokio::test]
    async fn test_malformed_entry_skipped_not_fatal() {
        let store = Arc::new(InMemoryStore::new());
        // Persisted directly, bypassing admission: semantic without a concept.
        let bad = MemoryEntry::new(MemoryKind::Semantic, "orphan fact", EntryContext::new());
        store.insert(&bad).await.unwrap();
        store
            .insert(&procedural_entry("drain connections before shutdown"))
            .await
            .unwrap();

        let result = pipeline(store)
            .retrieve(&RetrievalQuery::new("drain connections"))
            .await
            .unwrap();
        assert_eq!(result.entries.len(), 1);
        assert!(result.entries[0].entry.content.contains("drain"));
    }

    #[tokio::test]
    async fn test_usage_count_updated_on_return() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(&procedural_entry("vacuum the database weekly"))
            .await
            .unwrap();

        let p = pipeline(store.clone());
        p.retrieve(&RetrievalQuery::new("vacuum database")).await.unwrap();

        let entries = store.query(&EntryFilter::all()).await.unwrap();
        assert_eq!(entries[0].usage_count, 1);
    }

    #[tokio::test]
    async fn test_kind_restriction_respected() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(&procedural_entry("reindex after bulk load"))
            .await
            .unwrap();
        store
            .insert(&semantic_entry("bulk load bypasses triggers", "bulk load"))
            .await
            .unwrap();

        let result = pipeline(store)
            .retrieve(
                &RetrievalQuery::new("bulk load").with_kinds(vec![MemoryKind::Semantic]),
            )
            .await
            .unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].entry.kind, MemoryKind::Semantic);
    }

    #[tokio::test]
    async fn test_ties_break_toward_reusable_kinds() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();

        let mut episodic = MemoryEntry::new(
            MemoryKind::Episodic,
            "deploy window moved",
            EntryContext::new()
                .with_timestamp(now)
                .with_participants(["ops"]),
        );
        let mut procedural = procedural_entry("deploy window moved");
        // Identical content and timestamps: relevance and recency tie.
        episodic.created_at = now;
        episodic.last_used_at = now;
        procedural.created_at = now;
        procedural.last_used_at = now;

        store.insert(&episodic).await.unwrap();
        store.insert(&procedural).await.unwrap();

        let result = pipeline(store)
            .retrieve(&RetrievalQuery::new("deploy window"))
            .await
            .unwrap();
        assert_eq!(result.entries[0].entry.kind, MemoryKind::Procedural);
    }

    #[tokio::test]
    async fn test_context_block_groups_by_kind() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(&procedural_entry("warm the cache after deploys"))
            .await
            .unwrap();
        store
            .insert(&semantic_entry("the cache holds 10k entries", "cache"))
            .await
            .unwrap();

        let result = pipeline(store)
            .retrieve(&RetrievalQuery::new("cache deploys entries"))
            .await
            .unwrap();
        let block = &result.context_block;
        assert!(block.contains("### Proven procedures"));
        assert!(block.contains("### Known facts"));
        let proc_pos = block.find("Proven procedures").unwrap();
        let fact_pos = block.find("Known facts").unwrap();
        assert!(proc_pos < fact_pos);
    }

    #[tokio::test]
    async fn test_retrieval_is_deterministic() {
        let store = Arc::new(InMemoryStore::new());
        // Distinct word counts give each entry a distinct relevance score.
        for content in [
            "rotate logs",
            "rotate keys quarterly",
            "rotate the on-call schedule every single week",
        ] {
            store.insert(&procedural_entry(content)).await.unwrap();
        }

        let p = pipeline(store);
        let query = RetrievalQuery::new("rotate");
        let first = p.retrieve(&query).await.unwrap();
        let second = p.retrieve(&query).await.unwrap();
        let ids = |r: &RetrievalResult| {
            r.entries.iter().map(|e| e.entry.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }
}
