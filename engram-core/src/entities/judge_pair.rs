// engram-core/src/entities/judge_pair.rs
// ============================================================================
// Module: JudgePair Entity
// Description: A normalized, unordered pairing of two attempts under judgment.
// Purpose: Give the judge driver one canonical row per unordered pair within
// a run, regardless of enumeration order.
// Dependencies: serde, crate::id, crate::time, crate::error
// ============================================================================

//! ## Overview
//! `JudgePair` is unique on `(run_id, left_attempt_id, right_attempt_id)`,
//! but the driver that constructs pairs from attempt combinations always
//! normalizes `left`/`right` so the attempt with the lexicographically
//! smaller id is `left`. That normalization is what makes the pair unique
//! regardless of which order the driver happened to enumerate the two
//! attempts in.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::error::EngramError;
use crate::id::ContentId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Creation Inputs
// ============================================================================

/// The fields that identify a judge pair for idempotent `add`.
#[derive(Debug, Clone, Serialize)]
pub struct JudgePairInputs {
    /// The run both attempts belong to.
    pub run_id: ContentId,
    /// The attempt with the lexicographically smaller id.
    pub left_attempt_id: ContentId,
    /// The attempt with the lexicographically larger id.
    pub right_attempt_id: ContentId,
    /// The judge prompt version used for this pairing.
    pub prompt_version: String,
}

// ============================================================================
// SECTION: JudgePair
// ============================================================================

/// A normalized, unordered pairing of two attempts under judgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgePair {
    /// Content-derived id; see [`JudgePairInputs`].
    pub id: ContentId,
    /// The run both attempts belong to.
    pub run_id: ContentId,
    /// The attempt with the lexicographically smaller id.
    pub left_attempt_id: ContentId,
    /// The attempt with the lexicographically larger id.
    pub right_attempt_id: ContentId,
    /// The judge prompt version used for this pairing.
    pub prompt_version: String,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
}

impl JudgePair {
    /// Normalizes two attempt ids into `(left, right)` order: the
    /// lexicographically smaller id is always `left`. This is what
    /// guarantees `(a, b)` and `(b, a)` derive the same pair id.
    #[must_use]
    pub fn normalize(a: ContentId, b: ContentId) -> (ContentId, ContentId) {
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Derives the content id for a set of (already normalized) creation
    /// inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &JudgePairInputs) -> Result<ContentId, EngramError> {
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
    fn normalize_is_order_independent() {
        let a = ContentId::parse(&"1".repeat(64)).unwrap();
        let b = ContentId::parse(&"2".repeat(64)).unwrap();
        assert_eq!(JudgePair::normalize(a.clone(), b.clone()), JudgePair::normalize(b, a));
    }

    #[test]
    fn pair_id_is_stable_regardless_of_enumeration_order() {
        let run_id = ContentId::parse(&"3".repeat(64)).unwrap();
        let a = ContentId::parse(&"1".repeat(64)).unwrap();
        let b = ContentId::parse(&"2".repeat(64)).unwrap();

        let (left1, right1) = JudgePair::normalize(a.clone(), b.clone());
        let (left2, right2) = JudgePair::normalize(b, a);

        let id1 = JudgePair::derive_id(&JudgePairInputs {
            run_id: run_id.clone(),
            left_attempt_id: left1,
            right_attempt_id: right1,
            prompt_version: "v1".to_owned(),
        })
        .unwrap();
        let id2 = JudgePair::derive_id(&JudgePairInputs {
            run_id,
            left_attempt_id: left2,
            right_attempt_id: right2,
            prompt_version: "v1".to_owned(),
        })
        .unwrap();
        assert_eq!(id1, id2);
    }
}
