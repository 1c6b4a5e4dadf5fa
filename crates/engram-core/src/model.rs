//! Kind classification and per-kind validation.
//!
//! `classify` picks a kind for unclassified content from an ordered rule
//! list, so the same input always lands on the same kind. `validate` checks
//! the required-field set for an entry's kind in a single dispatch; callers
//! get every problem at once rather than the first one.

use engram_state::{EntryContext, MemoryEntry, MemoryKind};
use serde::{Deserialize, Serialize};

/// One missing or invalid field, with a caller-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Classify content into a memory kind.
///
/// Rules are checked in a fixed order and the first match wins:
/// 1. a `task_id` binding means Working scratch state,
/// 2. a trigger condition means a Prospective intention,
/// 3. a timestamp plus participants means an Episodic event,
/// 4. a procedure field or step-shaped content means Procedural,
/// 5. everything else is a Semantic fact.
pub fn classify(content: &str, context: &EntryContext) -> MemoryKind {
    if context.task_id.is_some() {
        return MemoryKind::Working;
    }
    if context.trigger_condition.is_some() {
        return MemoryKind::Prospective;
    }
    if context.timestamp.is_some() && !context.participants.is_empty() {
        return MemoryKind::Episodic;
    }
    if context.procedure.is_some() || looks_like_steps(content) {
        return MemoryKind::Procedural;
    }
    MemoryKind::Semantic
}

/// Content reads as an ordered procedure: at least two numbered lines.
fn looks_like_steps(content: &str) -> bool {
    let numbered = content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            let mut chars = trimmed.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_digit())
                && matches!(chars.next(), Some('.') | Some(')'))
        })
        .count();
    numbered >= 2
}

/// Validate an entry against its kind's required-field set.
///
/// Returns every violation; an empty vec means the entry is well-formed.
pub fn validate(entry: &MemoryEntry) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if entry.content.trim().is_empty() {
        errors.push(FieldError::new("content", "must not be empty"));
    }
    if let Some(confidence) = entry.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            errors.push(FieldError::new(
                "confidence",
                format!("must be within [0.0, 1.0], got {confidence}"),
            ));
        }
    }

    let ctx = &entry.context;
    match entry.kind {
        MemoryKind::Episodic => {
            if ctx.timestamp.is_none() {
                errors.push(FieldError::new("timestamp", "required for episodic entries"));
            }
            if ctx.participants.is_empty() {
                errors.push(FieldError::new(
                    "participants",
                    "episodic entries need at least one participant",
                ));
            }
        }
        MemoryKind::Semantic => {
            if ctx.concept.as_deref().map_or(true, |c| c.trim().is_empty()) {
                errors.push(FieldError::new("concept", "required for semantic entries"));
            }
            if entry.confidence.is_none() {
                errors.push(FieldError::new(
                    "confidence",
                    "semantic entries must state an explicit confidence",
                ));
            }
        }
        MemoryKind::Prospective => {
            if ctx.task.as_deref().map_or(true, |t| t.trim().is_empty()) {
                errors.push(FieldError::new("task", "required for prospective entries"));
            }
            if ctx
                .trigger_condition
                .as_deref()
                .map_or(true, |t| t.trim().is_empty())
            {
                errors.push(FieldError::new(
                    "trigger_condition",
                    "required for prospective entries",
                ));
            }
        }
        MemoryKind::Procedural => {
            if ctx.procedure.as_deref().map_or(true, |p| p.trim().is_empty()) {
                errors.push(FieldError::new("procedure", "required for procedural entries"));
            }
        }
        MemoryKind::Working => {
            if ctx.task_id.as_deref().map_or(true, |t| t.trim().is_empty()) {
                errors.push(FieldError::new("task_id", "required for working entries"));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use engram_state::EntryContext;

    use super::*;

    #[test]
    fn test_classify_task_id_wins_over_trigger() {
        let context = EntryContext::new()
            .with_task_id("t-1")
            .with_trigger("after the deploy");
        assert_eq!(classify("note", &context), MemoryKind::Working);
    }

    #[test]
    fn test_classify_trigger_means_prospective() {
        let context = EntryContext::new()
            .with_task("rotate the API key")
            .with_trigger("next release cut");
        assert_eq!(classify("rotate the key", &context), MemoryKind::Prospective);
    }

    #[test]
    fn test_classify_dated_event_with_participants_is_episodic() {
        let context = EntryContext::new()
            .with_timestamp(Utc::now())
            .with_participants(["alice", "bob"]);
        assert_eq!(classify("retro discussion", &context), MemoryKind::Episodic);
    }

    #[test]
    fn test_classify_numbered_steps_are_procedural() {
        let content = "1. stop the service\n2. swap the binary\n3. restart";
        assert_eq!(classify(content, &EntryContext::new()), MemoryKind::Procedural);
    }

    #[test]
    fn test_classify_defaults_to_semantic() {
        assert_eq!(
            classify("the staging cluster has 4 nodes", &EntryContext::new()),
            MemoryKind::Semantic
        );
    }

    #[test]
    fn test_classify_is_deterministic() {
        let context = EntryContext::new().with_timestamp(Utc::now());
        let first = classify("a plain note", &context);
        for _ in 0..5 {
            assert_eq!(classify("a plain note", &context), first);
        }
    }

    #[test]
    fn test_validate_episodic_missing_participants() {
        let entry = MemoryEntry::new(
            MemoryKind::Episodic,
            "deploy review happened",
            EntryContext::new().with_timestamp(Utc::now()),
        );
        let errors = validate(&entry);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "participants");
    }

    #[test]
    fn test_validate_semantic_requires_concept_and_confidence() {
        let entry = MemoryEntry::new(MemoryKind::Semantic, "some fact", EntryContext::new());
        let fields: Vec<_> = validate(&entry).into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"concept".to_string()));
        assert!(fields.contains(&"confidence".to_string()));
    }

    #[test]
    fn test_validate_reports_all_errors_at_once() {
        let entry = MemoryEntry::new(MemoryKind::Prospective, "", EntryContext::new());
        let errors = validate(&entry);
        assert_eq!(errors.len(), 3); // content, task, trigger_condition
    }

    #[test]
    fn test_validate_confidence_out_of_range() {
        let entry = MemoryEntry::new(
            MemoryKind::Semantic,
            "fact",
            EntryContext::new().with_concept("clusters"),
        )
        .with_confidence(1.5);
        let errors = validate(&entry);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "confidence");
    }

    #[test]
    fn test_validate_well_formed_entry_passes() {
        let entry = MemoryEntry::new(
            MemoryKind::Procedural,
            "pin the toolchain before bisecting",
            EntryContext::new().with_procedure("pin the toolchain before bisecting"),
        );
        assert!(validate(&entry).is_empty());
    }
}
