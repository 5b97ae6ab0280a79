// engram-core/src/entities/attempt_step.rs
// ============================================================================
// Module: AttemptStep Entity
// Description: One logged step within an Attempt's execution.
// Purpose: Provide the ordered, append-only timeline narrative diff and
// adoption read back.
// Dependencies: serde, serde_json, crate::id, crate::time, crate::error
// ============================================================================

//! ## Overview
//! Steps are append-only and fully immutable: their id covers the owning
//! attempt, position, kind, and payload. `learn_complete` steps are the
//! provenance adoption reads to pull knowledge item ids through from the
//! winning attempt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::EngramError;
use crate::id::ContentId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Kind
// ============================================================================

/// The category of an [`AttemptStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStepKind {
    /// A reflect-stage observation recorded during the attempt.
    Reflect,
    /// The attempt's learning pipeline completed; carries knowledge item
    /// ids adoption pulls through on a win.
    LearnComplete,
    /// The attempt raised an error.
    Error,
}

// ============================================================================
// SECTION: Creation Inputs
// ============================================================================

/// The fields that identify a step for idempotent `add`.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptStepInputs {
    /// The attempt this step belongs to.
    pub attempt_id: ContentId,
    /// Zero-based position within the attempt's timeline.
    pub step_index: u32,
    /// The category of this step.
    pub kind: AttemptStepKind,
    /// Step input payload.
    pub input: Value,
    /// Step output payload.
    pub output: Value,
    /// Free-text observation attached to the step.
    pub observation: String,
}

// ============================================================================
// SECTION: AttemptStep
// ============================================================================

/// One append-only entry in an attempt's execution timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptStep {
    /// Content-derived id; see [`AttemptStepInputs`].
    pub id: ContentId,
    /// The attempt this step belongs to.
    pub attempt_id: ContentId,
    /// Zero-based position within the attempt's timeline.
    pub step_index: u32,
    /// The category of this step.
    pub kind: AttemptStepKind,
    /// Step input payload.
    pub input: Value,
    /// Step output payload.
    pub output: Value,
    /// Free-text observation attached to the step.
    pub observation: String,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
}

impl AttemptStep {
    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &AttemptStepInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }

    /// Extracts knowledge item ids carried by a `learn_complete` step's
    /// output payload, under the `"knowledgeItems"` key.
    #[must_use]
    pub fn knowledge_item_ids(&self) -> Vec<ContentId> {
        if self.kind != AttemptStepKind::LearnComplete {
            return Vec::new();
        }
        self.output
            .get("knowledgeItems")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|raw| ContentId::parse(raw).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn non_learn_complete_step_has_no_knowledge_items() {
        let step = AttemptStep {
            id: ContentId::parse(&"a".repeat(64)).unwrap(),
            attempt_id: ContentId::parse(&"b".repeat(64)).unwrap(),
            step_index: 0,
            kind: AttemptStepKind::Reflect,
            input: Value::Null,
            output: json!({"knowledgeItems": ["c".repeat(64)]}),
            observation: String::new(),
            created_at: Timestamp::now(),
        };
        assert!(step.knowledge_item_ids().is_empty());
    }

    #[test]
    fn learn_complete_step_extracts_knowledge_items() {
        let known = "d".repeat(64);
        let step = AttemptStep {
            id: ContentId::parse(&"a".repeat(64)).unwrap(),
            attempt_id: ContentId::parse(&"b".repeat(64)).unwrap(),
            step_index: 1,
            kind: AttemptStepKind::LearnComplete,
            input: Value::Null,
            output: json!({"knowledgeItems": [known.clone()]}),
            observation: String::new(),
            created_at: Timestamp::now(),
        };
        assert_eq!(step.knowledge_item_ids(), vec![ContentId::parse(&known).unwrap()]);
    }
}
