//! Greedy token-budget allocation over ranked candidates.
//!
//! The allocator never re-ranks: it walks the candidates in the order given,
//! takes what fits, and skips what does not. Selection order is therefore
//! exactly ranking order, and the total never exceeds the budget.

use tracing::warn;

/// Rough token count for a text: about four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Result of one allocation pass.
#[derive(Debug, Clone)]
pub struct Allocation<T> {
    /// Chosen items with their token costs, in input order.
    pub selected: Vec<(T, usize)>,
    /// Total tokens consumed by `selected`.
    pub tokens_used: usize,
    /// Budget left unspent.
    pub leftover: usize,
    /// Candidates that did not fit.
    pub skipped: usize,
    /// True when utilization crossed the warning ratio.
    pub near_limit: bool,
}

/// Select a prefix-respecting subset of `ranked` whose costs fit `budget`.
///
/// A zero or negative budget selects nothing. `warn_ratio` is the utilization
/// fraction past which a warning is logged.
pub fn allocate<T>(
    ranked: impl IntoIterator<Item = (T, usize)>,
    budget: i64,
    warn_ratio: f64,
) -> Allocation<T> {
    if budget <= 0 {
        return Allocation {
            selected: Vec::new(),
            tokens_used: 0,
            leftover: 0,
            skipped: ranked.into_iter().count(),
            near_limit: false,
        };
    }

    let budget = budget as usize;
    let mut selected = Vec::new();
    let mut tokens_used = 0usize;
    let mut skipped = 0usize;

    for (item, tokens) in ranked {
        if tokens_used + tokens <= budget {
            tokens_used += tokens;
            selected.push((item, tokens));
        } else {
            skipped += 1;
        }
    }

    let near_limit = tokens_used as f64 > warn_ratio * budget as f64;
    if near_limit {
        warn!(
            tokens_used,
            budget,
            utilization = tokens_used as f64 / budget as f64,
            "token budget nearly exhausted"
        );
    }

    Allocation {
        selected,
        tokens_used,
        leftover: budget - tokens_used,
        skipped,
        near_limit,
    }
}
