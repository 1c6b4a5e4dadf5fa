//! Multi-reviewer consensus for memory admission.
//!
//! All reviewers run concurrently, each under its own deadline. A reviewer
//! that errors or times out is excluded from the average rather than dragging
//! it down, and the result is flagged `degraded` when too few reviewers
//! responded for the average to mean anything. Results aggregate in reviewer
//! registration order, so the same votes always produce the same output.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engram_state::{EntryContext, MemoryKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// The candidate under review.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub content: String,
    pub kind: MemoryKind,
    pub context: EntryContext,
}

/// One reviewer's judgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVote {
    /// Quality score on the 1..=10 scale.
    pub score: u8,
    /// Why the reviewer scored as it did.
    pub rationale: String,
    /// Self-reported confidence in [0,1]; `None` counts as full weight.
    pub confidence: Option<f64>,
}

/// Why a reviewer produced no usable vote.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReviewError {
    #[error("reviewer exceeded its {}ms deadline", .timeout.as_millis())]
    Timeout { timeout: Duration },
    #[error("reviewer failed: {0}")]
    Failed(String),
}

/// An independent quality judge. Implementations wrap whatever actually
/// scores content (a model call, a heuristic, a remote service); the panel
/// only needs the vote back within the deadline.
#[async_trait]
pub trait Reviewer: Send + Sync {
    fn name(&self) -> &str;

    async fn review(&self, request: &ReviewRequest) -> Result<ReviewVote, ReviewError>;
}

/// A vote attributed to its reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedVote {
    pub reviewer: String,
    pub vote: ReviewVote,
}

/// A failure attributed to its reviewer.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributedFailure {
    pub reviewer: String,
    pub error: ReviewError,
}

/// Aggregated panel outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusResult {
    /// Mean score over usable votes, confidence-weighted when configured.
    /// 0.0 when nobody voted.
    pub avg_score: f64,
    /// Population variance of the usable scores (unweighted).
    pub variance: f64,
    /// Usable votes, in reviewer registration order.
    pub votes: Vec<AttributedVote>,
    /// Reviewers excluded for erroring or timing out, in registration order.
    pub failures: Vec<AttributedFailure>,
    /// Too few reviewers responded for the average to be trusted.
    pub degraded: bool,
    /// Score variance crossed the disagreement threshold.
    pub disagreement: bool,
}

impl ConsensusResult {
    pub fn responders(&self) -> usize {
        self.votes.len()
    }

    /// Whether this result clears the quality gate. A degraded result never
    /// passes: with too few votes the gate fails safe and rejects.
    pub fn passes(&self, threshold: f64) -> bool {
        !self.degraded && self.avg_score > threshold
    }
}

/// Knobs for one panel.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Per-reviewer deadline.
    pub timeout: Duration,
    /// Weight votes by self-reported confidence.
    pub weight_by_confidence: bool,
    /// Variance above which `disagreement` is set.
    pub disagreement_variance: f64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            weight_by_confidence: true,
            disagreement_variance: 4.0,
        }
    }
}

/// A fixed panel of reviewers consulted on every admission.
pub struct ReviewPanel {
    reviewers: Vec<Arc<dyn Reviewer>>,
    config: PanelConfig,
}

impl ReviewPanel {
    pub fn new(reviewers: Vec<Arc<dyn Reviewer>>, config: PanelConfig) -> Self {
        Self { reviewers, config }
    }

    pub fn reviewer_count(&self) -> usize {
        self.reviewers.len()
    }

    /// Run every reviewer concurrently and aggregate.
    pub async fn review(&self, request: ReviewRequest) -> ConsensusResult {
        let request = Arc::new(request);

        let handles: Vec<_> = self
            .reviewers
            .iter()
            .map(|reviewer| {
                let reviewer = Arc::clone(reviewer);
                let request = Arc::clone(&request);
                let timeout = self.config.timeout;
                tokio::spawn(async move {
                    let name = reviewer.name().to_string();
                    let outcome = match tokio::time::timeout(timeout, reviewer.review(&request)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ReviewError::Timeout { timeout }),
                    };
                    (name, outcome)
                })
            })
            .collect();

        let mut votes = Vec::new();
        let mut failures = Vec::new();

        // Awaiting in spawn order keeps vote ordering (and thus the whole
        // result) deterministic regardless of which task finishes first.
        for handle in handles {
            let (reviewer, outcome) = match handle.await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "reviewer task panicked");
                    failures.push(AttributedFailure {
                        reviewer: "<unknown>".to_string(),
                        error: ReviewError::Failed(e.to_string()),
                    });
                    continue;
                }
            };

            match outcome {
                Ok(vote) if (1..=10).contains(&vote.score) => {
                    debug!(reviewer = %reviewer, score = vote.score, "vote received");
                    votes.push(AttributedVote { reviewer, vote });
                }
                Ok(vote) => {
                    warn!(reviewer = %reviewer, score = vote.score, "out-of-range score excluded");
                    failures.push(AttributedFailure {
                        reviewer,
                        error: ReviewError::Failed(format!(
                            "score {} outside 1..=10",
                            vote.score
                        )),
                    });
                }
                Err(error) => {
                    warn!(reviewer = %reviewer, error = %error, "reviewer excluded");
                    failures.push(AttributedFailure { reviewer, error });
                }
            }
        }

        self.aggregate(votes, failures)
    }

    fn aggregate(
        &self,
        votes: Vec<AttributedVote>,
        failures: Vec<AttributedFailure>,
    ) -> ConsensusResult {
        let scores: Vec<f64> = votes.iter().map(|v| f64::from(v.vote.score)).collect();

        let avg_score = if scores.is_empty() {
            0.0
        } else if self.config.weight_by_confidence {
            let weights: Vec<f64> = votes
                .iter()
                .map(|v| v.vote.confidence.unwrap_or(1.0).clamp(0.0, 1.0))
                .collect();
            let total: f64 = weights.iter().sum();
            if total > 0.0 {
                scores.iter().zip(&weights).map(|(s, w)| s * w).sum::<f64>() / total
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            }
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        let variance = if scores.len() < 2 {
            0.0
        } else {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64
        };

        // A panel of one is allowed to decide alone; any larger panel needs
        // at least two responders before its average is trusted.
        let degraded = self.reviewers.len() >= 2 && votes.len() < 2;
        let disagreement = variance > self.config.disagreement_variance;

        if degraded {
            warn!(
                configured = self.reviewers.len(),
                responded = votes.len(),
                "consensus degraded"
            );
        }

        ConsensusResult {
            avg_score,
            variance,
            votes,
            failures,
            degraded,
            disagreement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted reviewer for panel tests.
    struct StubReviewer {
        name: &'static str,
        behavior: StubBehavior,
    }

    enum StubBehavior {
        Vote(u8, Option<f64>),
        Fail,
        Hang,
    }

    #[async_trait]
    impl Reviewer for StubReviewer {
        fn name(&self) -> &str {
            self.name
        }

        async fn review(&self, _request: &ReviewRequest) -> Result<ReviewVote, ReviewError> {
            match self.behavior {
                StubBehavior::Vote(score, confidence) => Ok(ReviewVote {
                    score,
                    rationale: "scripted".to_string(),
                    confidence,
                }),
                StubBehavior::Fail => Err(ReviewError::Failed("scripted failure".to_string())),
                StubBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    unreachable!("deadline should fire first")
                }
            }
        }
    }

    fn stub(name: &'static str, behavior: StubBehavior) -> Arc<dyn Reviewer> {
        Arc::new(StubReviewer { name, behavior })
    }

    fn panel(reviewers: Vec<Arc<dyn Reviewer>>) -> ReviewPanel {
        ReviewPanel::new(
            reviewers,
            PanelConfig {
                timeout: Duration::from_millis(50),
                weight_by_confidence: false,
                disagreement_variance: 4.0,
            },
        )
    }

    fn request() -> ReviewRequest {
        ReviewRequest {
            content: "the linker needs lld on CI".to_string(),
            kind: MemoryKind::Semantic,
            context: EntryContext::new(),
        }
    }

    #[tokio::test]
    async fn test_all_respond_plain_average() {
        let panel = panel(vec![
            stub("a", StubBehavior::Vote(6, None)),
            stub("b", StubBehavior::Vote(8, None)),
            stub("c", StubBehavior::Vote(7, None)),
        ]);
        let result = panel.review(request()).await;
        assert!((result.avg_score - 7.0).abs() < 1e-9);
        assert!(!result.degraded);
        assert_eq!(result.responders(), 3);
    }

    #[tokio::test]
    async fn test_votes_keep_registration_order() {
        let panel = panel(vec![
            stub("first", StubBehavior::Vote(5, None)),
            stub("second", StubBehavior::Hang),
            stub("third", StubBehavior::Vote(9, None)),
        ]);
        let result = panel.review(request()).await;
        let names: Vec<&str> = result.votes.iter().map(|v| v.reviewer.as_str()).collect();
        assert_eq!(names, vec!["first", "third"]);
    }

    #[tokio::test]
    async fn test_failure_excluded_from_average() {
        let panel = panel(vec![
            stub("a", StubBehavior::Vote(6, None)),
            stub("b", StubBehavior::Fail),
            stub("c", StubBehavior::Vote(8, None)),
        ]);
        let result = panel.review(request()).await;
        assert!((result.avg_score - 7.0).abs() < 1e-9);
        assert!(!result.degraded);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].reviewer, "b");
    }

    #[tokio::test]
    async fn test_two_timeouts_degrade_even_a_perfect_score() {
        let panel = panel(vec![
            stub("a", StubBehavior::Vote(10, None)),
            stub("b", StubBehavior::Hang),
            stub("c", StubBehavior::Hang),
        ]);
        let result = panel.review(request()).await;
        assert!(result.degraded);
        assert!((result.avg_score - 10.0).abs() < 1e-9);
        assert!(!result.passes(4.0), "degraded result must fail the gate");
        assert!(matches!(
            result.failures[0].error,
            ReviewError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn test_single_reviewer_panel_is_never_degraded() {
        let panel = panel(vec![stub("solo", StubBehavior::Vote(9, None))]);
        let result = panel.review(request()).await;
        assert!(!result.degraded);
        assert!(result.passes(4.0));
    }

    #[tokio::test]
    async fn test_no_votes_fails_gate_without_degraded_single() {
        let panel = panel(vec![stub("solo", StubBehavior::Fail)]);
        let result = panel.review(request()).await;
        assert!(!result.degraded);
        assert_eq!(result.avg_score, 0.0);
        assert!(!result.passes(4.0));
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_a_failure() {
        let panel = panel(vec![
            stub("a", StubBehavior::Vote(0, None)),
            stub("b", StubBehavior::Vote(11, None)),
            stub("c", StubBehavior::Vote(5, None)),
        ]);
        let result = panel.review(request()).await;
        assert_eq!(result.responders(), 1);
        assert_eq!(result.failures.len(), 2);
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn test_confidence_weighting_shifts_average() {
        let panel = ReviewPanel::new(
            vec![
                stub("sure", StubBehavior::Vote(9, Some(1.0))),
                stub("unsure", StubBehavior::Vote(3, Some(0.1))),
            ],
            PanelConfig {
                timeout: Duration::from_millis(50),
                weight_by_confidence: true,
                disagreement_variance: 100.0,
            },
        );
        let result = panel.review(request()).await;
        // (9*1.0 + 3*0.1) / 1.1
        assert!((result.avg_score - 9.3 / 1.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_disagreement_flag() {
        let panel = panel(vec![
            stub("low", StubBehavior::Vote(1, None)),
            stub("high", StubBehavior::Vote(10, None)),
        ]);
        let result = panel.review(request()).await;
        assert!(result.disagreement);
        assert!(!result.degraded);
    }
}
