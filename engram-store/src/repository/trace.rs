// engram-store/src/repository/trace.rs
// ============================================================================
// Module: Trace Repository
// Description: add/get/list for the immutable Trace entity.
// Purpose: Back capture (§6) and the material reflect groups into insights
// (§4.H).
// Dependencies: rusqlite, engram-core, super
// ============================================================================

use engram_core::ContentId;
use engram_core::EngramError;
use engram_core::Timestamp;
use engram_core::Trace;
use engram_core::TraceInputs;
use engram_core::TraceOutcome;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use super::Repository;
use super::encode_json;
use super::lock;

/// Optional narrowing applied by [`Repository::list_traces`].
#[derive(Debug, Clone, Default)]
pub struct TraceFilters {
    /// Restrict to traces with this outcome.
    pub outcome: Option<TraceOutcome>,
}

fn outcome_label(outcome: TraceOutcome) -> &'static str {
    match outcome {
        TraceOutcome::Success => "success",
        TraceOutcome::Failure => "failure",
        TraceOutcome::Partial => "partial",
    }
}

fn parse_outcome(label: &str) -> Result<TraceOutcome, EngramError> {
    match label {
        "success" => Ok(TraceOutcome::Success),
        "failure" => Ok(TraceOutcome::Failure),
        "partial" => Ok(TraceOutcome::Partial),
        other => Err(EngramError::External(format!("unknown traces.outcome: {other}"))),
    }
}

type TraceRow = (String, String, Option<String>, Option<String>, String, String, String, String);

fn row_to_trace(row: &Row<'_>) -> rusqlite::Result<TraceRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?))
}

fn build_trace(raw: TraceRow) -> Result<Trace, EngramError> {
    let (id, subject_id, task_description, session_id, executions_json, outcome, discovered_issues_json, created_at) = raw;
    Ok(Trace {
        id: id.try_into()?,
        subject_id,
        task_description,
        session_id,
        executions: serde_json::from_str(&executions_json)
            .map_err(|err| EngramError::External(format!("failed to decode executions: {err}")))?,
        outcome: parse_outcome(&outcome)?,
        discovered_issues: serde_json::from_str(&discovered_issues_json)
            .map_err(|err| EngramError::External(format!("failed to decode discovered issues: {err}")))?,
        created_at: Timestamp::parse(&created_at)?,
    })
}

const TRACE_COLUMNS: &str =
    "id, subject_id, task_description, session_id, executions_json, outcome, discovered_issues_json, created_at";

impl Repository {
    /// Inserts a trace if it does not already exist, returning the stored
    /// row either way. Traces are write-once: an existing row is returned
    /// verbatim rather than merged.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error, or
    /// [`EngramError::Validation`] if the derived trace fails validation.
    pub fn add_trace(&self, inputs: TraceInputs) -> Result<Trace, EngramError> {
        let id = Trace::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        tx.execute(
            &format!(
                "INSERT OR IGNORE INTO traces ({TRACE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                id.as_str(),
                inputs.subject_id,
                inputs.task_description,
                inputs.session_id,
                encode_json(&serde_json::to_value(&inputs.executions).unwrap_or_default())?,
                outcome_label(inputs.outcome),
                encode_json(&serde_json::to_value(&inputs.discovered_issues).unwrap_or_default())?,
                Timestamp::now().to_rfc3339(),
            ],
        )
        .map_err(|err| EngramError::External(format!("failed to insert trace: {err}")))?;
        let raw = tx
            .query_row(&format!("SELECT {TRACE_COLUMNS} FROM traces WHERE id = ?1"), params![id.as_str()], row_to_trace)
            .map_err(|err| EngramError::External(format!("failed to read back trace: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let trace = build_trace(raw)?;
        trace.validate()?;
        self.record_audit("trace.add", serde_json::to_value(&trace).unwrap_or_default())?;
        Ok(trace)
    }

    /// Fetches a trace by id.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn get_trace(&self, id: &ContentId) -> Result<Option<Trace>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        connection
            .query_row(&format!("SELECT {TRACE_COLUMNS} FROM traces WHERE id = ?1"), params![id.as_str()], row_to_trace)
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read trace: {err}")))?
            .map(build_trace)
            .transpose()
    }

    /// Lists traces, optionally narrowed by outcome.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_traces(&self, filters: &TraceFilters) -> Result<Vec<Trace>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT {TRACE_COLUMNS} FROM traces WHERE (?1 IS NULL OR outcome = ?1) ORDER BY created_at ASC"
            ))
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![filters.outcome.map(outcome_label)], row_to_trace)
            .map_err(|err| EngramError::External(format!("failed to list traces: {err}")))?;
        rows.map(|row| build_trace(row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?))
            .collect()
    }
}
