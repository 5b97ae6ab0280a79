// engram-cli/src/envelope.rs
// ============================================================================
// Module: JSON Output Envelope
// Description: The `{apiVersion, cmd, ok, data?, errors?}` contract every
// verb's machine-facing output follows (spec §6).
// Purpose: Give every command a single place that turns a result into the
// envelope and the process exit code.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`emit`] is the one call site every command function feeds its result
//! through. Success renders `data`; failure renders `errors` as one entry
//! per offending field for a validation failure, or one entry carrying the
//! error's taxonomy tag and message otherwise. The envelope itself always
//! goes to stdout; [`crate::emit_error`] is for startup failures that occur
//! before a `cmd` name is known.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;

use serde_json::Value;
use serde_json::json;
use tracing::error;

use crate::error::CliError;
use crate::write_stdout_line;

/// The envelope's `apiVersion` value (spec §6).
const API_VERSION: &str = "v1";

/// Renders `result` as a JSON envelope for `cmd`, writes it to stdout, and
/// returns the process exit code (spec §6: zero on success, non-zero on
/// error).
pub fn emit(cmd: &str, result: Result<Value, CliError>) -> ExitCode {
    match result {
        Ok(data) => {
            let envelope = json!({"apiVersion": API_VERSION, "cmd": cmd, "ok": true, "data": data});
            let _ = write_stdout_line(&envelope.to_string());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(cmd, error = %err, "command failed");
            let envelope = json!({"apiVersion": API_VERSION, "cmd": cmd, "ok": false, "errors": error_entries(&err)});
            let _ = write_stdout_line(&envelope.to_string());
            ExitCode::FAILURE
        }
    }
}

/// Projects a [`CliError`] into the envelope's `errors` array: one entry
/// per field for a validation failure, one entry otherwise.
fn error_entries(err: &CliError) -> Vec<Value> {
    if let Some(fields) = err.field_errors() {
        return fields.iter().map(|field| json!({"tag": err.tag(), "path": field.path, "message": field.message})).collect();
    }
    vec![json!({"tag": err.tag(), "message": err.to_string()})]
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use engram_core::EngramError;
    use engram_core::FieldError;

    use super::*;

    #[test]
    fn error_entries_carries_one_per_field_for_validation() {
        let err = CliError::Engram(EngramError::Validation(vec![FieldError::new("goal", "must not be empty")]));
        let entries = error_entries(&err);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["path"], "goal");
        assert_eq!(entries[0]["tag"], "ValidationError");
    }

    #[test]
    fn error_entries_carries_one_entry_for_non_validation_errors() {
        let err = CliError::Engram(EngramError::State("missing markers".to_owned()));
        let entries = error_entries(&err);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["tag"], "StateError");
    }
}
