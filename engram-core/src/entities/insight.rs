// engram-core/src/entities/insight.rs
// ============================================================================
// Module: Insight Entity
// Description: A candidate pattern emitted by the reflect stage.
// Purpose: Hold a grouped-error observation pending curation into a
// KnowledgeItem.
// Dependencies: serde, crate::id, crate::time, crate::error
// ============================================================================

//! ## Overview
//! Reflect groups failed-trace errors by `(tool, file, message)` and emits
//! one `Insight` per group whose confidence clears the emission threshold.
//! Insights are transient: curate consumes them in `(pattern, description)`
//! groups and deletes the source rows. The id is derived from `pattern` and
//! `description` alone, so repeated runs against the same failure group
//! resolve to the same row rather than accumulating duplicates.

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
// SECTION: Creation Inputs
// ============================================================================

/// The fields that identify an insight for idempotent `add`.
#[derive(Debug, Clone, Serialize)]
pub struct InsightInputs {
    /// The grouped failure pattern, e.g. `"tool:file:message"`.
    pub pattern: String,
    /// Human-readable description of the pattern.
    pub description: String,
}

// ============================================================================
// SECTION: Insight
// ============================================================================

/// A candidate pattern awaiting curation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Content-derived id; see [`InsightInputs`].
    pub id: ContentId,
    /// The grouped failure pattern.
    pub pattern: String,
    /// Human-readable description of the pattern.
    pub description: String,
    /// Trace ids that contributed to this group.
    pub related_subjects: Vec<ContentId>,
    /// Count of contributing traces.
    pub frequency: u32,
    /// `min(1.0, containing_traces / total_failed_traces)`.
    pub confidence: f64,
    /// Free-form tags attached by reflect.
    pub meta_tags: Vec<String>,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
}

impl Insight {
    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &InsightInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }

    /// Validates field-level invariants ahead of a store write.
    ///
    /// # Errors
    /// Returns [`EngramError::Validation`] if `pattern` or `description` is
    /// empty, or `confidence` is outside `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<(), EngramError> {
        let mut errors = Vec::new();
        if self.pattern.trim().is_empty() {
            errors.push(FieldError::new("pattern", "must not be empty"));
        }
        if self.description.trim().is_empty() {
            errors.push(FieldError::new("description", "must not be empty"));
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

    /// The promotion-eligibility threshold used by reflect (§4.K):
    /// insights below this confidence are discarded rather than emitted.
    #[must_use]
    pub const fn emission_threshold() -> f64 {
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

    #[test]
    fn dedupe_key_matches_pattern_and_description() {
        let inputs_a = InsightInputs {
            pattern: "cargo:build.rs:missing feature".to_owned(),
            description: "build.rs assumed a feature that was not enabled".to_owned(),
        };
        let inputs_b = InsightInputs {
            pattern: "cargo:build.rs:missing feature".to_owned(),
            description: "build.rs assumed a feature that was not enabled".to_owned(),
        };
        assert_eq!(Insight::derive_id(&inputs_a).unwrap(), Insight::derive_id(&inputs_b).unwrap());
    }
}
