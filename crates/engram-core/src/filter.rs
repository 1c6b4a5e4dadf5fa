//! Trivial-content filter: the cheap pre-review gate.
//!
//! Rules run in registration order and the first match wins, so a given
//! input always produces the same verdict. The protection checks run before
//! any rule: content carrying a failure signal, a significance tag, or a
//! multi-step shape is never trivial, no matter what a rule would say.

use engram_state::EntryContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of running the filter over one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrivialVerdict {
    /// Whether the content was judged trivial.
    pub trivial: bool,
    /// Name of the rule that fired, when one did.
    pub rule: Option<String>,
    /// Human-readable reason for the verdict.
    pub reason: String,
    /// How sure the deciding rule was, in [0,1]. 1.0 for non-trivial verdicts.
    pub confidence: f64,
}

impl TrivialVerdict {
    fn not_trivial(reason: impl Into<String>) -> Self {
        Self {
            trivial: false,
            rule: None,
            reason: reason.into(),
            confidence: 1.0,
        }
    }
}

/// A single pattern-based triviality rule.
pub trait TrivialRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return a reason and confidence when the rule matches.
    fn evaluate(&self, content: &str, context: &EntryContext) -> Option<(String, f64)>;
}

/// Ordered rule list with protection checks. Synchronous and allocation-light;
/// this runs on every store call before any reviewer is consulted.
pub struct TrivialFilter {
    rules: Vec<Box<dyn TrivialRule>>,
    failure_signal: Regex,
}

impl TrivialFilter {
    /// Empty filter; nothing is trivial until rules are added.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            failure_signal: Regex::new(
                r"(?i)\b(error|failed|failure|panic|crash|denied|timeout|exception|regression)\b",
            )
            .expect("failure-signal pattern is valid"),
        }
    }

    /// Filter with the built-in rule set, in order: greetings, clean success
    /// notices, debug noise, documentation echoes.
    pub fn with_default_rules() -> Self {
        let mut filter = Self::new();
        filter.push_rule(Box::new(GreetingRule::new()));
        filter.push_rule(Box::new(CleanSuccessRule::new()));
        filter.push_rule(Box::new(DebugNoiseRule::new()));
        filter.push_rule(Box::new(DocEchoRule::new()));
        filter
    }

    /// Append a rule. Order matters: earlier rules win.
    pub fn push_rule(&mut self, rule: Box<dyn TrivialRule>) {
        self.rules.push(rule);
    }

    pub fn evaluate(&self, content: &str, context: &EntryContext) -> TrivialVerdict {
        if let Some(reason) = self.protection(content, context) {
            debug!(reason = %reason, "content protected from trivial filtering");
            return TrivialVerdict::not_trivial(reason);
        }

        for rule in &self.rules {
            if let Some((reason, confidence)) = rule.evaluate(content, context) {
                debug!(rule = rule.name(), reason = %reason, "trivial content filtered");
                return TrivialVerdict {
                    trivial: true,
                    rule: Some(rule.name().to_string()),
                    reason,
                    confidence,
                };
            }
        }

        TrivialVerdict::not_trivial("no rule matched")
    }

    /// Content that must never be filtered, regardless of rules.
    fn protection(&self, content: &str, context: &EntryContext) -> Option<String> {
        if self.failure_signal.is_match(content) {
            return Some("carries a failure signal".to_string());
        }
        for tag in ["decision", "important", "lesson", "postmortem"] {
            if context.has_tag(tag) {
                return Some(format!("tagged '{tag}'"));
            }
        }
        if content.lines().filter(|l| !l.trim().is_empty()).count() >= 3 {
            return Some("multi-step content".to_string());
        }
        None
    }
}

impl Default for TrivialFilter {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

// -- built-in rules ----------------------------------------------------------

/// Short conversational pleasantries.
struct GreetingRule {
    pattern: Regex,
}

impl GreetingRule {
    fn new() -> Self {
        Self {
            pattern: Regex::new(
                r"(?i)^\s*(hi|hello|hey|thanks|thank you|goodbye|bye|ok|okay|got it|sounds good)\b[\s!.,]*.{0,40}$",
            )
            .expect("greeting pattern is valid"),
        }
    }
}

impl TrivialRule for GreetingRule {
    fn name(&self) -> &'static str {
        "greeting"
    }

    fn evaluate(&self, content: &str, _context: &EntryContext) -> Option<(String, f64)> {
        self.pattern
            .is_match(content)
            .then(|| ("conversational pleasantry".to_string(), 0.95))
    }
}

/// Success notices with no diagnostic value ("Build succeeded").
struct CleanSuccessRule {
    pattern: Regex,
}

impl CleanSuccessRule {
    fn new() -> Self {
        Self {
            pattern: Regex::new(
                r"(?i)\b(succeeded|passed|completed|finished|done|success(ful)?|all green)\b",
            )
            .expect("clean-success pattern is valid"),
        }
    }
}

impl TrivialRule for CleanSuccessRule {
    fn name(&self) -> &'static str {
        "clean_success"
    }

    fn evaluate(&self, content: &str, _context: &EntryContext) -> Option<(String, f64)> {
        (content.len() <= 120 && self.pattern.is_match(content))
            .then(|| ("routine success notice".to_string(), 0.9))
    }
}

/// Debug/trace output pasted as content.
struct DebugNoiseRule {
    pattern: Regex,
}

impl DebugNoiseRule {
    fn new() -> Self {
        Self {
            pattern: Regex::new(r"(?i)^\s*(\[?(debug|trace)\]?[:\s]|println!|dbg!|console\.log)")
                .expect("debug-noise pattern is valid"),
        }
    }
}

impl TrivialRule for DebugNoiseRule {
    fn name(&self) -> &'static str {
        "debug_noise"
    }

    fn evaluate(&self, content: &str, _context: &EntryContext) -> Option<(String, f64)> {
        self.pattern
            .is_match(content)
            .then(|| ("debug output".to_string(), 0.85))
    }
}

/// Content flagged as restating existing documentation.
struct DocEchoRule {
    pattern: Regex,
}

impl DocEchoRule {
    fn new() -> Self {
        Self {
            pattern: Regex::new(r"(?i)^\s*(see|as documented in|per) (the )?(docs|documentation|readme)\b")
                .expect("doc-echo pattern is valid"),
        }
    }
}

impl TrivialRule for DocEchoRule {
    fn name(&self) -> &'static str {
        "doc_echo"
    }

    fn evaluate(&self, content: &str, context: &EntryContext) -> Option<(String, f64)> {
        (context.has_tag("documentation") || self.pattern.is_match(content))
            .then(|| ("restates existing documentation".to_string(), 0.8))
    }
}
