// engram-core/src/entities/task.rs
// ============================================================================
// Module: Task Entity
// Description: A unit of work submitted to the bBoN orchestrator.
// Purpose: Anchor one or more Runs against a fixed subject and specification.
// Dependencies: serde, serde_json, crate::id, crate::time, crate::error
// ============================================================================

//! ## Overview
//! A `Task` names what should be done (`spec`) and, optionally, who it is
//! done for (`subject_id`). Tasks are immutable; re-submitting the same
//! subject and spec resolves to the same row. `spec` is carried as an
//! opaque value rather than a Rust struct because task specs come from
//! callers outside this crate's control (§9 design note on duck-typed JSON
//! columns); [`TaskSpec`] gives the one caller-facing shape (the bBoN task
//! spec, §6) a typed accessor without constraining what `spec` may hold.

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
// SECTION: TaskSpec
// ============================================================================

/// The caller-facing shape of a bBoN task submission (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// What the task is trying to accomplish. Required.
    pub goal: String,
    /// The subject this task is performed for, if any.
    pub subject_id: Option<String>,
    /// Constraints the solution must respect.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Free-form additional context.
    pub context: Option<Value>,
}

impl TaskSpec {
    /// Validates that `goal` is present and non-empty.
    ///
    /// # Errors
    /// Returns [`EngramError::Validation`] if `goal` is empty.
    pub fn validate(&self) -> Result<(), EngramError> {
        if self.goal.trim().is_empty() {
            Err(EngramError::validation("goal", "must not be empty"))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Creation Inputs
// ============================================================================

/// The fields that identify a task for idempotent `add`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInputs {
    /// The subject this task is performed for, if any.
    pub subject_id: Option<String>,
    /// The opaque task specification.
    pub spec: Value,
}

// ============================================================================
// SECTION: Task
// ============================================================================

/// A unit of work submitted to the bBoN orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Content-derived id; see [`TaskInputs`].
    pub id: ContentId,
    /// The subject this task is performed for, if any.
    pub subject_id: Option<String>,
    /// The opaque task specification.
    pub spec: Value,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
}

impl Task {
    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &TaskInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }

    /// Validates field-level invariants ahead of a store write.
    ///
    /// # Errors
    /// Returns [`EngramError::Validation`] if `spec` is not a JSON object.
    pub fn validate(&self) -> Result<(), EngramError> {
        if self.spec.is_object() {
            Ok(())
        } else {
            Err(EngramError::Validation(vec![FieldError::new("spec", "must be a JSON object")]))
        }
    }
}
