// engram-core/src/entities/run.rs
// ============================================================================
// Module: Run Entity
// Description: One Best-of-N execution of a Task.
// Purpose: Fix the attempt fan-out width, seed, and generation config shared
// by every Attempt spawned under it.
// Dependencies: serde, serde_json, crate::id, crate::time, crate::error
// ============================================================================

//! ## Overview
//! A `Run` fixes `n` (the number of attempts to generate), a `seed` for
//! reproducibility, and a provider-specific `config` blob. Its id covers
//! all three plus the owning task, so two runs with identical resolved
//! inputs collapse to the same row.

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
// SECTION: Creation Inputs
// ============================================================================

/// The fields that identify a run for idempotent `add`.
#[derive(Debug, Clone, Serialize)]
pub struct RunInputs {
    /// The task this run executes.
    pub task_id: ContentId,
    /// Number of attempts to generate.
    pub n: u32,
    /// Seed used for attempt generation.
    pub seed: i64,
    /// Provider-specific generation configuration.
    pub config: Value,
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// One Best-of-N execution of a [`Task`](super::task::Task).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Content-derived id; see [`RunInputs`].
    pub id: ContentId,
    /// The task this run executes.
    pub task_id: ContentId,
    /// Number of attempts to generate.
    pub n: u32,
    /// Seed used for attempt generation.
    pub seed: i64,
    /// Provider-specific generation configuration.
    pub config: Value,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
}

impl Run {
    /// Default fan-out width when a caller does not specify `n` (§4.M).
    pub const DEFAULT_N: u32 = 3;

    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &RunInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }

    /// Validates field-level invariants ahead of a store write.
    ///
    /// # Errors
    /// Returns [`EngramError::Validation`] if `n` is zero.
    pub fn validate(&self) -> Result<(), EngramError> {
        if self.n == 0 {
            Err(EngramError::validation("n", "must be at least 1"))
        } else {
            Ok(())
        }
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
    fn zero_n_fails_validation() {
        let run = Run {
            id: ContentId::parse(&"a".repeat(64)).unwrap(),
            task_id: ContentId::parse(&"b".repeat(64)).unwrap(),
            n: 0,
            seed: 1,
            config: Value::Null,
            created_at: Timestamp::now(),
        };
        assert!(matches!(run.validate(), Err(EngramError::Validation(errs)) if errs.first().map(|e| e.path.as_str()) == Some("n")));
    }
}
