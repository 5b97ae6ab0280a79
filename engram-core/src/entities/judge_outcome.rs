// engram-core/src/entities/judge_outcome.rs
// ============================================================================
// Module: JudgeOutcome Entity
// Description: The comparative judge's verdict on a JudgePair.
// Purpose: Carry the winning attempt, confidence, rationale, and narrative
// diff used by adoption to rank attempts.
// Dependencies: serde, serde_json, crate::id, crate::time, crate::error
// ============================================================================

//! ## Overview
//! At most one `JudgeOutcome` exists per pair; the judge driver enforces
//! this by checking for an existing outcome before invoking the LLM, since
//! two independent LLM calls against the same pair are not guaranteed to
//! produce byte-identical rationale and therefore cannot be relied on to
//! collide on content id alone. The judge itself reasons in terms of `A`/`B`
//! (see `engram_providers::judge::Verdict`); by the time an outcome reaches
//! this entity, `A`/`B` has already been resolved to the pair's concrete
//! `left_attempt_id`/`right_attempt_id`.

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
// SECTION: Creation Inputs
// ============================================================================

/// The fields that identify a judge outcome for idempotent `add`.
#[derive(Debug, Clone, Serialize)]
pub struct JudgeOutcomeInputs {
    /// The pair this outcome judges.
    pub pair_id: ContentId,
    /// The attempt the judge preferred.
    pub winner_attempt_id: ContentId,
    /// The judge's confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Free-text rationale.
    pub rationale: String,
    /// The structural narrative diff the judge was shown.
    pub narrative_diff: Value,
    /// The model identifier used to produce this outcome.
    pub model: String,
}

// ============================================================================
// SECTION: JudgeOutcome
// ============================================================================

/// The comparative judge's verdict on a [`JudgePair`](super::judge_pair::JudgePair).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeOutcome {
    /// Content-derived id; see [`JudgeOutcomeInputs`].
    pub id: ContentId,
    /// The pair this outcome judges.
    pub pair_id: ContentId,
    /// The attempt the judge preferred.
    pub winner_attempt_id: ContentId,
    /// The judge's confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Free-text rationale.
    pub rationale: String,
    /// The structural narrative diff the judge was shown.
    pub narrative_diff: Value,
    /// The model identifier used to produce this outcome.
    pub model: String,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
}

impl JudgeOutcome {
    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &JudgeOutcomeInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }

    /// Validates field-level invariants ahead of a store write.
    ///
    /// # Errors
    /// Returns [`EngramError::Validation`] if `confidence` is outside
    /// `[0.0, 1.0]` or `rationale` is empty.
    pub fn validate(&self) -> Result<(), EngramError> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.confidence) {
            errors.push(FieldError::new("confidence", "must be within [0.0, 1.0]"));
        }
        if self.rationale.trim().is_empty() {
            errors.push(FieldError::new("rationale", "must not be empty"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngramError::Validation(errors))
        }
    }
}
