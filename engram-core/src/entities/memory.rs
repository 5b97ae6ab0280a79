// engram-core/src/entities/memory.rs
// ============================================================================
// Module: Memory Entities
// Description: ShortTermMemory, WorkingMemory, and MemoryEvent.
// Purpose: Provide the run-scoped scratch store, the project-scoped durable
// notes store, and the append-only provenance log that ties both to the
// events that produced them.
// Dependencies: serde, serde_json, crate::id, crate::time, crate::error
// ============================================================================

//! ## Overview
//! `ShortTermMemory` is a run-scoped key/value slot: its id covers
//! `(run_id, key)` only, so re-keying overwrites in place (`value` mutates
//! freely) and `clear` drops every row for a run. `WorkingMemory` is a
//! project-scoped durable note whose id is derived from its project,
//! type, and content text — content and id are intentionally coupled, so
//! editing a working memory's text is modeled as retiring the old row and
//! adding a new one rather than as an in-place update. `MemoryEvent` is an
//! append-only provenance record of what happened to produce either kind
//! of memory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::EngramError;
use crate::error::FieldError;
use crate::id::ContentId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: ShortTermMemory
// ============================================================================

/// The fields that identify a short-term memory slot for idempotent `add`
/// and `upsert`.
#[derive(Debug, Clone, Serialize)]
pub struct ShortTermMemoryInputs {
    /// The run this slot is scoped to.
    pub run_id: ContentId,
    /// The slot's key.
    pub key: String,
}

/// A run-scoped, mutable key/value scratch slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortTermMemory {
    /// Content-derived id, covering `(run_id, key)` only.
    pub id: ContentId,
    /// The run this slot is scoped to.
    pub run_id: ContentId,
    /// The slot's key.
    pub key: String,
    /// Mutable: the slot's current value; overwritten on re-key.
    pub value: Value,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
}

impl ShortTermMemory {
    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &ShortTermMemoryInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }

    /// Validates field-level invariants ahead of a store write.
    ///
    /// # Errors
    /// Returns [`EngramError::Validation`] if `key` is empty.
    pub fn validate(&self) -> Result<(), EngramError> {
        if self.key.trim().is_empty() {
            Err(EngramError::validation("key", "must not be empty"))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: WorkingMemory
// ============================================================================

/// The classification of a [`WorkingMemory`] note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingMemoryType {
    /// A standing decision.
    Decision,
    /// A hard constraint.
    Invariant,
    /// A plain summary note.
    Summary,
}

/// The fields that identify a working memory note for idempotent `add`.
///
/// Content and id are intentionally coupled (see module overview): there
/// is no separate mutable `content` field on [`WorkingMemory`].
#[derive(Debug, Clone, Serialize)]
pub struct WorkingMemoryInputs {
    /// The project this note is scoped to.
    pub project_id: String,
    /// The note's classification.
    pub memory_type: WorkingMemoryType,
    /// The note's text. Part of the id; editing means adding a new note.
    pub content_text: String,
}

/// A project-scoped, durable note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingMemory {
    /// Content-derived id; see [`WorkingMemoryInputs`].
    pub id: ContentId,
    /// The project this note is scoped to.
    pub project_id: String,
    /// The note's classification.
    pub memory_type: WorkingMemoryType,
    /// The note's text.
    pub content_text: String,
    /// Mutable: provenance of the most recent promotion/upsert.
    pub provenance: Value,
    /// Mutable: stamped on every upsert, even when content is unchanged.
    pub updated_at: Timestamp,
}

impl WorkingMemory {
    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &WorkingMemoryInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }

    /// Validates field-level invariants ahead of a store write.
    ///
    /// # Errors
    /// Returns [`EngramError::Validation`] if `project_id` or
    /// `content_text` is empty.
    pub fn validate(&self) -> Result<(), EngramError> {
        let mut errors = Vec::new();
        if self.project_id.trim().is_empty() {
            errors.push(FieldError::new("project_id", "must not be empty"));
        }
        if self.content_text.trim().is_empty() {
            errors.push(FieldError::new("content_text", "must not be empty"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngramError::Validation(errors))
        }
    }
}

// ============================================================================
// SECTION: MemoryEvent
// ============================================================================

/// The kind of subject a [`MemoryEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySubjectKind {
    /// The event concerns a short-term memory slot.
    ShortTerm,
    /// The event concerns a working memory note.
    Working,
    /// The event concerns an insight.
    Insight,
}

/// The fields that identify a memory event for idempotent `add`.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryEventInputs {
    /// The memory row this event describes.
    pub subject_id: ContentId,
    /// Whether the subject is short-term or working memory.
    pub subject_kind: MemorySubjectKind,
    /// The event name (e.g. `"created"`, `"overwritten"`, `"cleared"`).
    pub event: String,
    /// Event-specific payload.
    pub data: Value,
}

/// An append-only provenance record of what happened to a memory row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    /// Content-derived id; see [`MemoryEventInputs`].
    pub id: ContentId,
    /// The memory row this event describes.
    pub subject_id: ContentId,
    /// Whether the subject is short-term or working memory.
    pub subject_kind: MemorySubjectKind,
    /// The event name.
    pub event: String,
    /// Event-specific payload.
    pub data: Value,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
}

impl MemoryEvent {
    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &MemoryEventInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use super::*;

    #[test]
    fn short_term_id_ignores_value() {
        let run_id = ContentId::parse(&"9".repeat(64)).unwrap();
        let inputs = ShortTermMemoryInputs { run_id, key: "scratchpad".to_owned() };
        let id = ShortTermMemory::derive_id(&inputs).unwrap();
        let id_again = ShortTermMemory::derive_id(&inputs).unwrap();
        assert_eq!(id, id_again);
    }

    #[test]
    fn working_memory_content_changes_id() {
        let inputs_a = WorkingMemoryInputs {
            project_id: "engram".to_owned(),
            memory_type: WorkingMemoryType::Invariant,
            content_text: "migrations are additive-only".to_owned(),
        };
        let inputs_b = WorkingMemoryInputs {
            project_id: "engram".to_owned(),
            memory_type: WorkingMemoryType::Invariant,
            content_text: "migrations are additive-only and numbered".to_owned(),
        };
        assert_ne!(
            WorkingMemory::derive_id(&inputs_a).unwrap(),
            WorkingMemory::derive_id(&inputs_b).unwrap()
        );
    }
}
