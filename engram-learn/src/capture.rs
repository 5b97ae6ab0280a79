// engram-learn/src/capture.rs
// ============================================================================
// Module: Capture
// Description: Accepts a trace payload from an external producer and
// writes it through the Repository.
// Purpose: Turn a JSON trace document (file, stdin, or literal argument)
// into a validated, idempotently stored Trace.
// Dependencies: engram-core, engram-store, serde_json
// ============================================================================

//! ## Overview
//! Capture resolves its input from three possible sources, in the order
//! file path, standard input, literal argument (the first one supplied
//! wins); parses it against the trace schema; and writes it through
//! [`engram_store::Repository::add_trace`], which is itself idempotent, so
//! resubmitting an identical payload is a no-op.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Read;
use std::path::Path;

use engram_core::EngramError;
use engram_core::Trace;
use engram_core::TraceInputs;
use engram_core::TraceOutcome;
use engram_core::ToolExecution;
use engram_store::Repository;
use serde::Deserialize;

// ============================================================================
// SECTION: Input Resolution
// ============================================================================

/// Resolves the raw trace payload text from the first available source, in
/// precedence order: `file`, then `stdin` (if the caller determined input is
/// available there, e.g. the process is not attached to a TTY), then
/// `literal`.
///
/// # Errors
/// Returns [`EngramError::External`] if `file` is set but cannot be read,
/// or [`EngramError::InvalidInput`] if none of the three sources yields
/// anything.
pub fn resolve_capture_payload(
    file: Option<&Path>,
    stdin: Option<&mut dyn Read>,
    literal: Option<&str>,
) -> Result<String, EngramError> {
    if let Some(path) = file {
        return fs::read_to_string(path)
            .map_err(|err| EngramError::External(format!("failed to read capture file {}: {err}", path.display())));
    }
    if let Some(reader) = stdin {
        let mut buffer = String::new();
        reader
            .read_to_string(&mut buffer)
            .map_err(|err| EngramError::External(format!("failed to read capture payload from stdin: {err}")))?;
        if !buffer.trim().is_empty() {
            return Ok(buffer);
        }
    }
    if let Some(text) = literal {
        return Ok(text.to_owned());
    }
    Err(EngramError::InvalidInput("capture requires a file path, stdin input, or a literal argument".to_owned()))
}

// ============================================================================
// SECTION: Document Schema
// ============================================================================

/// The external trace document shape (spec §6): camelCase field names,
/// converted into [`TraceInputs`] before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureDocument {
    subject_id: String,
    #[serde(default)]
    task_description: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    executions: Vec<ToolExecution>,
    outcome: TraceOutcome,
    #[serde(default)]
    discovered_issues: Vec<String>,
}

impl From<CaptureDocument> for TraceInputs {
    fn from(document: CaptureDocument) -> Self {
        Self {
            subject_id: document.subject_id,
            task_description: document.task_description,
            session_id: document.session_id,
            executions: document.executions,
            outcome: document.outcome,
            discovered_issues: document.discovered_issues,
        }
    }
}

// ============================================================================
// SECTION: Capture
// ============================================================================

/// Parses `payload` as a trace document and writes it through `repository`.
///
/// # Errors
/// Returns [`EngramError::InvalidInput`] if `payload` is not valid JSON or
/// does not match the trace schema, or [`EngramError::Validation`] if the
/// parsed trace fails entity validation.
pub fn capture(repository: &Repository, payload: &str) -> Result<Trace, EngramError> {
    let document: CaptureDocument =
        serde_json::from_str(payload).map_err(|err| EngramError::InvalidInput(format!("capture payload did not match the trace schema: {err}")))?;
    repository.add_trace(document.into())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
