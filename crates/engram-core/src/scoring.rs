//! Relevance signals: keyword overlap and the pluggable semantic scorer.
//!
//! Both signals are pure functions of their inputs, so retrieval ranking is
//! reproducible run to run. The semantic side is a trait seam: the default
//! is a lexical Jaccard stand-in, and hosts with an embedding service plug
//! their own scorer in through the coordinator.

use std::collections::HashSet;

/// Similarity in [0.0, 1.0] between two texts.
///
/// Implementations must be deterministic for a given input pair and must
/// stay within the unit interval; the duplicate check and the relevance
/// blend both depend on that contract.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Default scorer: Jaccard similarity over lowercase word sets.
///
/// A lexical approximation, not an embedding. Good enough to catch restated
/// duplicates and to contribute a stable semantic signal without any
/// external service.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOverlapScorer;

impl SimilarityScorer for TokenOverlapScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        let set_a = word_set(a);
        let set_b = word_set(b);
        if set_a.is_empty() && set_b.is_empty() {
            return 1.0;
        }
        if set_a.is_empty() || set_b.is_empty() {
            return 0.0;
        }
        let intersection = set_a.intersection(&set_b).count() as f64;
        let union = set_a.union(&set_b).count() as f64;
        intersection / union
    }
}

/// Fraction of the query's terms present in the content, in [0.0, 1.0].
///
/// An empty or all-stopword query scores 0.0 against everything.
pub fn keyword_score(query: &str, content: &str) -> f64 {
    let terms = word_set(query);
    if terms.is_empty() {
        return 0.0;
    }
    let content_words = word_set(content);
    let matched = terms.iter().filter(|t| content_words.contains(*t)).count();
    matched as f64 / terms.len() as f64
}

/// Lowercased alphanumeric words of length >= 2.
fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2)
        .map(|w| w.to_lowercase())
        .collect()
}
