//! Schema definitions for Engram memory entries.
//!
//! Tables:
//! - memories: persisted memory entries (the only shared mutable resource)
//!
//! Domain types (`MemoryEntry`, `MemoryKind`, `EntryContext`) live here so the
//! core crate and the storage backends share one definition; the SurrealDB row
//! type (`MemoryEntryRecord`) maps them onto the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// The five memory semantics. Closed enum; an entry's kind is immutable once
/// set and determines which `EntryContext` fields are mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A dated event with participants.
    Episodic,
    /// A durable fact or concept with a confidence level.
    Semantic,
    /// A future intention bound to a trigger condition.
    Prospective,
    /// A reusable procedure, strengthened by usage.
    Procedural,
    /// Task-scoped scratch state, hard-deleted on task completion.
    Working,
}

impl MemoryKind {
    /// All kinds, in declaration order.
    pub const ALL: [MemoryKind; 5] = [
        MemoryKind::Episodic,
        MemoryKind::Semantic,
        MemoryKind::Prospective,
        MemoryKind::Procedural,
        MemoryKind::Working,
    ];

    /// Stable string form used in storage rows and context labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Prospective => "prospective",
            Self::Procedural => "procedural",
            Self::Working => "working",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content digest (SHA-256 hex) over an entry's kind and normalized content.
///
/// Backs the store-level uniqueness constraint that resolves concurrent
/// near-duplicate admissions: two entries of the same kind whose content
/// normalizes identically share a digest, and the second insert fails.
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `of_content` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the digest of an entry's kind plus normalized content.
    ///
    /// Normalization lowercases and collapses whitespace runs so trivially
    /// reformatted duplicates still collide.
    pub fn of_content(kind: MemoryKind, content: &str) -> Self {
        let normalized = content
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(normalized.as_bytes());
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = crate::error::StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(crate::error::StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structured metadata attached to an entry.
///
/// Carries the provenance fields every entry may have (session, source task,
/// tags) plus the kind-specific fields. All kind-specific fields are optional
/// here; `engram-core` validates the required set for the entry's kind before
/// anything reaches a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryContext {
    /// Session that produced this entry.
    pub session_id: Option<String>,
    /// Task the content came from.
    pub source_task: Option<String>,
    /// Free-form tags (e.g. "decision", "error").
    #[serde(default)]
    pub tags: Vec<String>,

    /// Episodic: when the event happened. Stored as RFC 3339 text; only the
    /// row-level timestamps use native SurrealDB datetimes.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Episodic: who was involved.
    #[serde(default)]
    pub participants: Vec<String>,
    /// Semantic: the concept the fact is about.
    pub concept: Option<String>,
    /// Prospective: the task to perform.
    pub task: Option<String>,
    /// Prospective: the condition that fires the task.
    pub trigger_condition: Option<String>,
    /// Procedural: the procedure description.
    pub procedure: Option<String>,
    /// Working: the active task this entry is scoped to.
    pub task_id: Option<String>,

    /// Arbitrary host-supplied metadata.
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl EntryContext {
    pub fn new() -> Self {
        Self {
            attributes: serde_json::Value::Null,
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_source_task(mut self, source_task: impl Into<String>) -> Self {
        self.source_task = Some(source_task.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_concept(mut self, concept: impl Into<String>) -> Self {
        self.concept = Some(concept.into());
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_trigger(mut self, trigger_condition: impl Into<String>) -> Self {
        self.trigger_condition = Some(trigger_condition.into());
        self
    }

    pub fn with_procedure(mut self, procedure: impl Into<String>) -> Self {
        self.procedure = Some(procedure.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Whether any tag matches, case-insensitively.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// A persisted memory entry — the unit every pipeline operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier (UUID v4), assigned at creation, immutable.
    pub id: String,
    /// Memory semantics; immutable once set.
    pub kind: MemoryKind,
    /// Free-text payload.
    pub content: String,
    /// Structured metadata, including kind-specific fields.
    pub context: EntryContext,
    /// Confidence in [0,1]. Required for Semantic entries; `None` elsewhere
    /// is read as 1.0 (see [`MemoryEntry::effective_confidence`]).
    pub confidence: Option<f64>,
    /// Digest backing the store-level duplicate constraint.
    pub content_digest: ContentDigest,
    /// Times retrieved; drives Procedural strengthening.
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    /// Updated on every successful retrieval.
    pub last_used_at: DateTime<Utc>,
}

impl MemoryEntry {
    /// Create a new entry with a fresh id and timestamps.
    pub fn new(kind: MemoryKind, content: impl Into<String>, context: EntryContext) -> Self {
        let content = content.into();
        let now = Utc::now();
        let content_digest = ContentDigest::of_content(kind, &content);
        MemoryEntry {
            id: Uuid::new_v4().to_string(),
            kind,
            content,
            context,
            confidence: None,
            content_digest,
            usage_count: 0,
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Confidence with the unset default applied.
    pub fn effective_confidence(&self) -> f64 {
        self.confidence.unwrap_or(1.0)
    }
}

/// Memory entry row stored in SurrealDB.
///
/// Flattens the fields SurrealDB indexes on (`kind`, `content_digest`,
/// `task_id`) to top level; everything else round-trips through the domain
/// types' serde impls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntryRecord {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    /// Entry UUID (unique)
    pub entry_id: String,
    /// Kind as its stable string form (indexed)
    pub kind: String,
    /// Free-text payload
    pub content: String,
    /// Structured context (JSON object)
    pub context: EntryContext,
    /// Confidence in [0,1], absent when never set
    pub confidence: Option<f64>,
    /// Content digest hex (unique together with kind)
    pub content_digest: String,
    /// Working-memory task binding, denormalized for indexed deletes
    pub task_id: Option<String>,
    /// Retrieval count
    pub usage_count: u64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub last_used_at: DateTime<Utc>,
}

impl MemoryEntryRecord {
    /// Build a DB row from a domain entry.
    pub fn from_entry(entry: &MemoryEntry) -> Self {
        MemoryEntryRecord {
            id: None,
            entry_id: entry.id.clone(),
            kind: entry.kind.as_str().to_string(),
            content: entry.content.clone(),
            context: entry.context.clone(),
            confidence: entry.confidence,
            content_digest: entry.content_digest.as_str().to_string(),
            task_id: entry.context.task_id.clone(),
            usage_count: entry.usage_count,
            created_at: entry.created_at,
            last_used_at: entry.last_used_at,
        }
    }

    /// Convert a DB row back into a domain entry.
    pub fn into_entry(self) -> Result<MemoryEntry, crate::error::StorageError> {
        let kind = match self.kind.as_str() {
            "episodic" => MemoryKind::Episodic,
            "semantic" => MemoryKind::Semantic,
            "prospective" => MemoryKind::Prospective,
            "procedural" => MemoryKind::Procedural,
            "working" => MemoryKind::Working,
            other => {
                return Err(crate::error::StorageError::Backend(format!(
                    "unknown memory kind in row: {other}"
                )))
            }
        };

        Ok(MemoryEntry {
            id: self.entry_id,
            kind,
            content: self.content,
            context: self.context,
            confidence: self.confidence,
            content_digest: ContentDigest::try_from(self.content_digest)?,
            usage_count: self.usage_count,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        })
    }
}
