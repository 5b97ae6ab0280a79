// engram-core/src/entities/knowledge_item.rs
// ============================================================================
// Module: KnowledgeItem Entity
// Description: A curated, durable unit of learned guidance.
// Purpose: Represent the promoted output of the curate stage: a fact worth
// keeping around and eventually rendering into a guidance document.
// Dependencies: serde, crate::id, crate::time, crate::error
// ============================================================================

//! ## Overview
//! A `KnowledgeItem` is produced by curation once two or more insights agree
//! on the same `(pattern, description)` and the aggregated confidence
//! clears the promotion threshold. Its id is derived from the fields that
//! define "the same fact" — type, text, scope, and module — so re-curating
//! an already-known fact is a no-op rather than a duplicate row. `helpful`
//! and `harmful` are the only fields that mutate after creation, and only
//! by increment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::error::EngramError;
use crate::error::FieldError;
use crate::id::ContentId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Kind
// ============================================================================

/// The classification of a [`KnowledgeItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeKind {
    /// A standalone observed fact.
    Fact,
    /// A recurring pattern extracted by curation.
    Pattern,
    /// A reusable procedure.
    Procedure,
    /// A recommended or discouraged action.
    Decision,
}

// ============================================================================
// SECTION: Creation Inputs
// ============================================================================

/// The fields that identify "the same fact" for idempotent `add`.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeItemInputs {
    /// Classification of the fact.
    pub kind: KnowledgeKind,
    /// The fact itself, as free text.
    pub text: String,
    /// The scope this fact applies to (e.g. `"repo"`).
    pub scope: String,
    /// The module or subsystem this fact concerns, if narrower than scope.
    pub module: Option<String>,
}

// ============================================================================
// SECTION: KnowledgeItem
// ============================================================================

/// A curated, content-addressed unit of learned guidance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Content-derived id; see [`KnowledgeItemInputs`].
    pub id: ContentId,
    /// Classification of the fact.
    pub kind: KnowledgeKind,
    /// The fact itself, as free text.
    pub text: String,
    /// The scope this fact applies to.
    pub scope: String,
    /// The narrower module this fact concerns, if any.
    pub module: Option<String>,
    /// Free-form tags attached at curation time.
    pub meta_tags: Vec<String>,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Mutable counter: positive feedback, advanced only by increment.
    pub helpful: u32,
    /// Mutable counter: negative feedback, advanced only by increment.
    pub harmful: u32,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
    /// Mutable: last time `helpful`/`harmful` changed.
    pub updated_at: Timestamp,
}

impl KnowledgeItem {
    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &KnowledgeItemInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }

    /// Validates field-level invariants ahead of a store write.
    ///
    /// # Errors
    /// Returns [`EngramError::Validation`] if `text` or `scope` is empty, or
    /// `confidence` is outside `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<(), EngramError> {
        let mut errors = Vec::new();
        if self.text.trim().is_empty() {
            errors.push(FieldError::new("text", "must not be empty"));
        }
        if self.scope.trim().is_empty() {
            errors.push(FieldError::new("scope", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            errors.push(FieldError::new("confidence", "must be within [0.0, 1.0]"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngramError::Validation(errors))
        }
    }

    /// The apply-eligibility threshold (§4.K): items below this confidence
    /// are excluded from the rendered guidance document.
    #[must_use]
    pub const fn apply_threshold() -> f64 {
        0.5
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use super::*;

    fn sample_inputs() -> KnowledgeItemInputs {
        KnowledgeItemInputs {
            kind: KnowledgeKind::Pattern,
            text: "Property does not exist on type".to_owned(),
            scope: "repo".to_owned(),
            module: None,
        }
    }

    #[test]
    fn same_inputs_derive_same_id() {
        let a = KnowledgeItem::derive_id(&sample_inputs()).unwrap();
        let b = KnowledgeItem::derive_id(&sample_inputs()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn confidence_out_of_range_fails_validation() {
        let item = KnowledgeItem {
            id: KnowledgeItem::derive_id(&sample_inputs()).unwrap(),
            kind: KnowledgeKind::Pattern,
            text: "x".to_owned(),
            scope: "y".to_owned(),
            module: None,
            meta_tags: vec![],
            confidence: 1.5,
            helpful: 0,
            harmful: 0,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        };
        assert!(item.validate().is_err());
    }
}
