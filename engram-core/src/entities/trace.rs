// engram-core/src/entities/trace.rs
// ============================================================================
// Module: Trace Entity
// Description: A captured record of one agent task execution.
// Purpose: Hold the raw material reflect later groups into insights.
// Dependencies: serde, crate::id, crate::time, crate::error
// ============================================================================

//! ## Overview
//! A `Trace` is written by capture and never mutated afterward. Its id
//! covers the entire content body, so resubmitting an identical trace
//! (same subject, task, session, executions, outcome, and discovered
//! issues) is a no-op rather than a duplicate row.

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
// SECTION: Errors and Executions
// ============================================================================

/// Severity of one [`ExecutionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// A blocking problem.
    Error,
    /// A non-blocking problem.
    Warning,
    /// An informational note.
    Info,
}

/// One tool-reported error or warning inside a [`ToolExecution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Name of the tool that reported this (e.g. `"tsc"`).
    pub tool: String,
    /// Severity of the report.
    pub severity: ErrorSeverity,
    /// The reported message text.
    pub message: String,
    /// File path the report concerns.
    pub file: String,
    /// Line number the report concerns.
    pub line: u32,
    /// Column number the report concerns, if known.
    pub column: Option<u32>,
}

/// Pass/fail result of a [`ToolExecution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The tool reported success.
    Pass,
    /// The tool reported failure.
    Fail,
}

/// One command run (build, test, or lint) inside a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    /// Name of the runner that executed this command (e.g. `"cargo"`).
    pub runner: String,
    /// The command line that was executed.
    pub command: String,
    /// Whether the command succeeded.
    pub status: ExecutionStatus,
    /// Errors and warnings reported by the command.
    pub errors: Vec<ExecutionError>,
}

/// Overall outcome of a trace's task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceOutcome {
    /// Every execution passed.
    Success,
    /// At least one execution failed and the task did not recover.
    Failure,
    /// Some executions failed but the overall task still produced value.
    Partial,
}

// ============================================================================
// SECTION: Creation Inputs
// ============================================================================

/// The full content of a trace, used verbatim to derive its id.
#[derive(Debug, Clone, Serialize)]
pub struct TraceInputs {
    /// The subject (agent, session owner) this trace belongs to.
    pub subject_id: String,
    /// Free-text description of the task attempted, if supplied.
    pub task_description: Option<String>,
    /// The session this trace was captured under, if supplied.
    pub session_id: Option<String>,
    /// Ordered tool executions that occurred during the task.
    pub executions: Vec<ToolExecution>,
    /// The overall outcome.
    pub outcome: TraceOutcome,
    /// Issues discovered while executing, independent of pass/fail.
    pub discovered_issues: Vec<String>,
}

// ============================================================================
// SECTION: Trace
// ============================================================================

/// A captured, immutable record of one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Content-derived id; see [`TraceInputs`].
    pub id: ContentId,
    /// The subject this trace belongs to.
    pub subject_id: String,
    /// Free-text description of the task attempted, if supplied.
    pub task_description: Option<String>,
    /// The session this trace was captured under, if supplied.
    pub session_id: Option<String>,
    /// Ordered tool executions that occurred during the task.
    pub executions: Vec<ToolExecution>,
    /// The overall outcome.
    pub outcome: TraceOutcome,
    /// Issues discovered while executing.
    pub discovered_issues: Vec<String>,
    /// Creation time, stamped by the store.
    pub created_at: Timestamp,
}

impl Trace {
    /// Derives the content id for a set of creation inputs.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if canonicalization fails.
    pub fn derive_id(inputs: &TraceInputs) -> Result<ContentId, EngramError> {
        ContentId::derive(inputs)
    }

    /// Validates field-level invariants ahead of a store write.
    ///
    /// # Errors
    /// Returns [`EngramError::Validation`] if `subject_id` is empty.
    pub fn validate(&self) -> Result<(), EngramError> {
        let mut errors = Vec::new();
        if self.subject_id.trim().is_empty() {
            errors.push(FieldError::new("subject_id", "must not be empty"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngramError::Validation(errors))
        }
    }

    /// Returns every reported error across every failed execution, the
    /// material reflect groups into insights.
    #[must_use]
    pub fn failed_errors(&self) -> Vec<&ExecutionError> {
        self.executions
            .iter()
            .filter(|execution| execution.status == ExecutionStatus::Fail)
            .flat_map(|execution| execution.errors.iter())
            .collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use super::*;

    fn sample_inputs() -> TraceInputs {
        TraceInputs {
            subject_id: "agent-1".to_owned(),
            task_description: Some("fix the build".to_owned()),
            session_id: Some("sess-1".to_owned()),
            executions: vec![],
            outcome: TraceOutcome::Failure,
            discovered_issues: vec![],
        }
    }

    #[test]
    fn identical_traces_derive_same_id() {
        let a = Trace::derive_id(&sample_inputs()).unwrap();
        let b = Trace::derive_id(&sample_inputs()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn failed_errors_filters_by_status() {
        let trace = Trace {
            id: ContentId::parse(&"a".repeat(64)).unwrap(),
            subject_id: "s".to_owned(),
            task_description: None,
            session_id: None,
            executions: vec![
                ToolExecution {
                    runner: "cargo".to_owned(),
                    command: "cargo build".to_owned(),
                    status: ExecutionStatus::Fail,
                    errors: vec![ExecutionError {
                        tool: "tsc".to_owned(),
                        severity: ErrorSeverity::Error,
                        message: "Property does not exist on type".to_owned(),
                        file: "src/test.ts".to_owned(),
                        line: 10,
                        column: None,
                    }],
                },
                ToolExecution {
                    runner: "cargo".to_owned(),
                    command: "cargo fmt --check".to_owned(),
                    status: ExecutionStatus::Pass,
                    errors: vec![],
                },
            ],
            outcome: TraceOutcome::Failure,
            discovered_issues: vec![],
            created_at: Timestamp::now(),
        };
        assert_eq!(trace.failed_errors().len(), 1);
    }
}
