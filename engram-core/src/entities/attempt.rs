// engram-core/src/entities/attempt.rs
// ============================================================================
// Module: Attempt Entity
// Description: One candidate solution generated under a Run.
// Purpose: Track the pending/running/completed-or-failed lifecycle of a
// single bBoN candidate.
// Dependencies: serde, crate::id, crate::time, crate::error
// ============================================================================

//! ## Overview
//! An `Attempt` is unique on `(run_id, ordinal)`; its id is derived from
//! that pair alone, since `status` and `result` mutate over the attempt's
//! lifetime and must never perturb its identity. The lifecycle is a strict
//! state machine: `Pending -> Running -> {Completed, Failed}`, with
//! `Completed` and `Failed` absorbing (terminal).

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
// SECTION: Status
// ============================================================================

/// Lifecycle state of an [`Attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Created but not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
}

impl AttemptStatus {
    /// Returns `true` if this status cannot transition further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` if `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

// ============================================================================
// SECTION: Creation Inputs
// ============================================================================

/// The fields that identify an attempt for idempotent `add`.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptInputs {
    /// The run this attempt belongs to.
    pub run_id: ContentId,
    /// Zero-based position within the run's `n` attempts.
    pub ordinal: u32,
}

// ============================================================================
// SECTION: Attempt
// ============================================================================

/// One candidate solution generated under a [`Run`](super::run::Run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// Content-derived id; see [`AttemptInputs`].
    pub id: ContentId,
    /// The run this attempt belongs to.
    pub run_id: ContentId,
    /// Zero-based position within the run's `n` attempts.
    pub ordinal: u32,
    /// Mutable: current lifecycle state.
    pub status: AttemptStatus,
    /// Mutable: the attempt's final payload once completed or failed.
    pub result: Option<Value>,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
    /// Mutable: stamped when the attempt reaches `completed`.
    pub completed_at: Option<Timestamp>,
}

impl Attempt {
    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &AttemptInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }

    /// Validates that transitioning to `next` is legal from this attempt's
    /// current status.
    ///
    /// # Errors
    /// Returns [`EngramError::State`] if the transition is not allowed
    /// (including any transition out of a terminal state).
    pub fn validate_transition(&self, next: AttemptStatus) -> Result<(), EngramError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(EngramError::State(format!(
                "attempt {} cannot transition from {:?} to {next:?}",
                self.id, self.status
            )))
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
    fn terminal_states_reject_further_transitions() {
        assert!(!AttemptStatus::Completed.can_transition_to(AttemptStatus::Running));
        assert!(!AttemptStatus::Failed.can_transition_to(AttemptStatus::Completed));
    }

    #[test]
    fn pending_must_go_through_running() {
        assert!(!AttemptStatus::Pending.can_transition_to(AttemptStatus::Completed));
        assert!(AttemptStatus::Pending.can_transition_to(AttemptStatus::Running));
    }

    #[test]
    fn ordinal_participates_in_id() {
        let run_id = ContentId::parse(&"c".repeat(64)).unwrap();
        let first = Attempt::derive_id(&AttemptInputs { run_id: run_id.clone(), ordinal: 0 }).unwrap();
        let second = Attempt::derive_id(&AttemptInputs { run_id, ordinal: 1 }).unwrap();
        assert_ne!(first, second);
    }
}
