//! Shared fixtures for the end-to-end tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engram_core::{
    InMemoryStore, MemoryConfig, MemoryCoordinator, ReviewError, ReviewRequest, ReviewVote,
    Reviewer,
};

/// What a scripted reviewer does when consulted.
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum Script {
    Score(u8),
    Fail,
    Hang,
}

/// Scripted reviewer that counts its invocations.
pub struct ScriptedReviewer {
    name: String,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedReviewer {
    pub fn new(name: impl Into<String>, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            script,
            calls: AtomicUsize::new(0),
        })
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, _request: &ReviewRequest) -> Result<ReviewVote, ReviewError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Score(score) => Ok(ReviewVote {
                score,
                rationale: "scripted".to_string(),
                confidence: None,
            }),
            Script::Fail => Err(ReviewError::Failed("scripted failure".to_string())),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                unreachable!("deadline should fire first")
            }
        }
    }
}

/// Test config: short reviewer deadline, unweighted averaging.
#[allow(dead_code)]
pub fn test_config() -> MemoryConfig {
    let mut config = MemoryConfig::default();
    config.reviewer_timeout = Duration::from_millis(100);
    config.weight_by_confidence = false;
    config
}

/// Coordinator over a fresh in-memory store with the given panel scores.
#[allow(dead_code)]
pub fn coordinator_scoring(scores: &[u8]) -> (Arc<InMemoryStore>, MemoryCoordinator) {
    let store = Arc::new(InMemoryStore::new());
    let reviewers = scores
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            ScriptedReviewer::new(format!("reviewer-{i}"), Script::Score(s)) as Arc<dyn Reviewer>
        })
        .collect();
    let coordinator = MemoryCoordinator::new(store.clone(), reviewers, test_config());
    (store, coordinator)
}
