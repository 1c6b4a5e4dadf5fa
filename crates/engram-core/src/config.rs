//! Tunable knobs for the storage and retrieval pipelines.

use std::time::Duration;

use engram_state::MemoryKind;
use serde::{Deserialize, Serialize};

/// Ranking priority per memory kind, used only to break relevance ties.
///
/// Procedural and Semantic outrank Episodic: reusable knowledge is worth more
/// in a context window than one-off events of equal relevance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KindPriorities {
    pub procedural: f64,
    pub semantic: f64,
    pub prospective: f64,
    pub working: f64,
    pub episodic: f64,
}

impl Default for KindPriorities {
    fn default() -> Self {
        Self {
            procedural: 1.0,
            semantic: 0.9,
            prospective: 0.6,
            working: 0.5,
            episodic: 0.3,
        }
    }
}

impl KindPriorities {
    pub fn for_kind(&self, kind: MemoryKind) -> f64 {
        match kind {
            MemoryKind::Procedural => self.procedural,
            MemoryKind::Semantic => self.semantic,
            MemoryKind::Prospective => self.prospective,
            MemoryKind::Working => self.working,
            MemoryKind::Episodic => self.episodic,
        }
    }
}

/// Configuration for the memory coordinator and both pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Consensus average a candidate must *exceed* to be persisted.
    pub quality_gate_threshold: f64,
    /// Similarity at or above which a candidate counts as a duplicate.
    pub duplicate_cutoff: f64,
    /// Per-reviewer deadline; a reviewer past it is an excluded failure.
    #[serde(with = "duration_ms")]
    pub reviewer_timeout: Duration,
    /// Score variance above which the panel is flagged as disagreeing.
    pub disagreement_variance: f64,
    /// Weight reviewer scores by their self-reported confidence.
    pub weight_by_confidence: bool,

    /// Keyword-overlap weight in the relevance blend.
    pub keyword_weight: f64,
    /// Semantic-similarity weight in the relevance blend.
    pub semantic_weight: f64,
    /// Tie-break priorities per kind.
    pub kind_priorities: KindPriorities,

    /// Token budget applied when a retrieval query does not set one.
    pub default_token_budget: i64,
    /// Fraction of the budget past which utilization is logged as a warning.
    pub budget_warn_ratio: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            quality_gate_threshold: 4.0,
            duplicate_cutoff: 0.9,
            reviewer_timeout: Duration::from_secs(3),
            disagreement_variance: 4.0,
            weight_by_confidence: true,
            keyword_weight: 0.5,
            semantic_weight: 0.5,
            kind_priorities: KindPriorities::default(),
            default_token_budget: 2000,
            budget_warn_ratio: 0.9,
        }
    }
}

impl MemoryConfig {
    pub fn with_quality_gate_threshold(mut self, threshold: f64) -> Self {
        self.quality_gate_threshold = threshold;
        self
    }

    pub fn with_duplicate_cutoff(mut self, cutoff: f64) -> Self {
        self.duplicate_cutoff = cutoff;
        self
    }

    pub fn with_reviewer_timeout(mut self, timeout: Duration) -> Self {
        self.reviewer_timeout = timeout;
        self
    }

    pub fn with_default_token_budget(mut self, budget: i64) -> Self {
        self.default_token_budget = budget;
        self
    }
}

/// Serialize `Duration` as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
