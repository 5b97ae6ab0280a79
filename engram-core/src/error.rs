// engram-core/src/error.rs
// ============================================================================
// Module: Engram Error Taxonomy
// Description: The shared error kinds raised across every Engram subsystem.
// Purpose: Give callers a stable, matchable vocabulary for failure handling.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every fallible Engram operation returns [`EngramError`]. The taxonomy is
//! deliberately small: each variant maps to one of the failure classes a
//! caller needs to branch on (retry, surface to the user, or treat as a
//! non-fatal lookup miss). Orchestrators wrap step failures by prefixing the
//! message with the step name rather than inventing new variants.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

// ============================================================================
// SECTION: Field Errors
// ============================================================================

/// One offending field surfaced by a [`EngramError::Validation`] failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path to the offending field (e.g. `"executions[0].status"`).
    pub path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl FieldError {
    /// Creates a new field error.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

// ============================================================================
// SECTION: Error Taxonomy
// ============================================================================

/// Errors raised across the Engram core, store, and orchestrator layers.
#[derive(Debug, Error)]
pub enum EngramError {
    /// Input failed a schema or range check at a repository or orchestrator
    /// boundary.
    #[error("validation failed: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),
    /// A referenced id was not present. Non-fatal to the store.
    #[error("not found: {0}")]
    NotFound(String),
    /// A precondition was unmet (missing database, missing markers,
    /// insufficient completed attempts, terminal-state transition).
    #[error("state error: {0}")]
    State(String),
    /// A uniqueness constraint was violated by a non-idempotent write.
    #[error("conflict: {0}")]
    Conflict(String),
    /// An LLM transport failure, parse failure of LLM output, or underlying
    /// I/O failure outside the core's control.
    #[error("external error: {0}")]
    External(String),
    /// Canonicalization rejected a non-finite number or non-plain mapping.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngramError {
    /// Builds a [`EngramError::Validation`] from a single field violation.
    #[must_use]
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(path, message)])
    }

    /// Wraps this error with the name of the orchestration step that failed,
    /// matching the `"<step> step failed: <message>"` propagation policy.
    #[must_use]
    pub fn wrap_step(self, step: &str) -> Self {
        let message = format!("{step} step failed: {self}");
        match self {
            Self::Validation(errors) => {
                Self::Validation(vec![FieldError::new(step, format_field_errors(&errors))])
            }
            Self::NotFound(_) => Self::NotFound(message),
            Self::State(_) => Self::State(message),
            Self::Conflict(_) => Self::Conflict(message),
            Self::External(_) => Self::External(message),
            Self::InvalidInput(_) => Self::InvalidInput(message),
        }
    }

    /// Returns the taxonomy tag for this error (stable, machine-readable).
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound(_) => "NotFound",
            Self::State(_) => "StateError",
            Self::Conflict(_) => "ConflictError",
            Self::External(_) => "ExternalError",
            Self::InvalidInput(_) => "InvalidInput",
        }
    }
}

/// Formats a slice of field errors as a semicolon-delimited list.
fn format_field_errors(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Result alias used throughout the Engram core and its dependents.
pub type EngramResult<T> = Result<T, EngramError>;
