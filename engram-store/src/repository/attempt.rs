// engram-store/src/repository/attempt.rs
// ============================================================================
// Module: Attempt Repository
// Description: add/get/list/update for Attempt, and add/get/list for
// AttemptStep.
// Purpose: Back the bBoN attempt lifecycle and its append-only step
// timeline (§4.M).
// Dependencies: rusqlite, engram-core, super
// ============================================================================

use engram_core::Attempt;
use engram_core::AttemptInputs;
use engram_core::AttemptStatus;
use engram_core::AttemptStep;
use engram_core::AttemptStepInputs;
use engram_core::AttemptStepKind;
use engram_core::ContentId;
use engram_core::EngramError;
use engram_core::Timestamp;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde_json::Value;

use super::Repository;
use super::encode_json;
use super::lock;

fn status_label(status: AttemptStatus) -> &'static str {
    match status {
        AttemptStatus::Pending => "pending",
        AttemptStatus::Running => "running",
        AttemptStatus::Completed => "completed",
        AttemptStatus::Failed => "failed",
    }
}

fn parse_status(label: &str) -> Result<AttemptStatus, EngramError> {
    match label {
        "pending" => Ok(AttemptStatus::Pending),
        "running" => Ok(AttemptStatus::Running),
        "completed" => Ok(AttemptStatus::Completed),
        "failed" => Ok(AttemptStatus::Failed),
        other => Err(EngramError::External(format!("unknown attempts.status: {other}"))),
    }
}

type AttemptRow = (String, String, u32, String, Option<String>, String, Option<String>);

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<AttemptRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?))
}

fn build_attempt(raw: AttemptRow) -> Result<Attempt, EngramError> {
    let (id, run_id, ordinal, status, result_json, created_at, completed_at) = raw;
    Ok(Attempt {
        id: id.try_into()?,
        run_id: run_id.try_into()?,
        ordinal,
        status: parse_status(&status)?,
        result: result_json.map(|raw| serde_json::from_str(&raw)).transpose()
            .map_err(|err| EngramError::External(format!("failed to decode result: {err}")))?,
        created_at: Timestamp::parse(&created_at)?,
        completed_at: completed_at.map(|raw| Timestamp::parse(&raw)).transpose()?,
    })
}

const ATTEMPT_COLUMNS: &str = "id, run_id, ordinal, status, result_json, created_at, completed_at";

/// Optional narrowing applied by [`Repository::list_attempts`].
#[derive(Debug, Clone, Default)]
pub struct AttemptFilters {
    /// Restrict to attempts belonging to this run.
    pub run_id: Option<ContentId>,
}

/// A patch to apply to an attempt via [`Repository::update_attempt`].
#[derive(Debug, Clone, Default)]
pub struct AttemptPatch {
    /// New status, if the caller wishes to transition it.
    pub status: Option<AttemptStatus>,
    /// New result payload, if the caller wishes to set it.
    pub result: Option<Value>,
}

impl Repository {
    /// Inserts an attempt if it does not already exist, returning the
    /// stored row either way. New rows start `pending`.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn add_attempt(&self, inputs: AttemptInputs) -> Result<Attempt, EngramError> {
        let id = Attempt::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        tx.execute(
            "INSERT OR IGNORE INTO attempts (id, run_id, ordinal, status, result_json, created_at, completed_at)
             VALUES (?1, ?2, ?3, 'pending', NULL, ?4, NULL)",
            params![id.as_str(), inputs.run_id.as_str(), inputs.ordinal, Timestamp::now().to_rfc3339()],
        )
        .map_err(|err| EngramError::External(format!("failed to insert attempt: {err}")))?;
        let raw = tx
            .query_row(&format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1"), params![id.as_str()], row_to_attempt)
            .map_err(|err| EngramError::External(format!("failed to read back attempt: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let attempt = build_attempt(raw)?;
        self.record_audit("attempt.add", serde_json::to_value(&attempt).unwrap_or_default())?;
        Ok(attempt)
    }

    /// Fetches an attempt by id.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn get_attempt(&self, id: &ContentId) -> Result<Option<Attempt>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        connection
            .query_row(&format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1"), params![id.as_str()], row_to_attempt)
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read attempt: {err}")))?
            .map(build_attempt)
            .transpose()
    }

    /// Lists attempts, optionally narrowed to one run, ordered by ordinal.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_attempts(&self, filters: &AttemptFilters) -> Result<Vec<Attempt>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE (?1 IS NULL OR run_id = ?1) ORDER BY ordinal ASC"
            ))
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![filters.run_id.as_ref().map(ContentId::as_str)], row_to_attempt)
            .map_err(|err| EngramError::External(format!("failed to list attempts: {err}")))?;
        rows.map(|row| build_attempt(row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?)).collect()
    }

    /// Applies a patch to an attempt, validating the status transition
    /// against the current row before writing, and stamping
    /// `completed_at` whenever the new status is terminal.
    ///
    /// # Errors
    /// Returns [`EngramError::NotFound`] if no such attempt exists, and
    /// [`EngramError::State`] if the requested status transition is not
    /// legal from the attempt's current status.
    pub fn update_attempt(&self, id: &ContentId, patch: AttemptPatch) -> Result<Attempt, EngramError> {
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        let raw = tx
            .query_row(&format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1"), params![id.as_str()], row_to_attempt)
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read attempt: {err}")))?
            .ok_or_else(|| EngramError::NotFound(format!("attempt {} not found", id.as_str())))?;
        let current = build_attempt(raw)?;

        let next_status = match patch.status {
            Some(status) => {
                current.validate_transition(status)?;
                status
            }
            None => current.status,
        };
        let next_result = patch.result.or(current.result.clone());
        let completed_at = if next_status.is_terminal() {
            Some(current.completed_at.unwrap_or_else(Timestamp::now))
        } else {
            None
        };

        tx.execute(
            "UPDATE attempts SET status = ?2, result_json = ?3, completed_at = ?4 WHERE id = ?1",
            params![
                id.as_str(),
                status_label(next_status),
                next_result.as_ref().map(encode_json).transpose()?,
                completed_at.map(|timestamp| timestamp.to_rfc3339()),
            ],
        )
        .map_err(|err| EngramError::External(format!("failed to update attempt: {err}")))?;
        let raw = tx
            .query_row(&format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1"), params![id.as_str()], row_to_attempt)
            .map_err(|err| EngramError::External(format!("failed to read back attempt: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let attempt = build_attempt(raw)?;
        self.record_audit("attempt.update", serde_json::to_value(&attempt).unwrap_or_default())?;
        Ok(attempt)
    }

    /// Inserts an attempt step if it does not already exist, returning the
    /// stored row either way.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn add_attempt_step(&self, inputs: AttemptStepInputs) -> Result<AttemptStep, EngramError> {
        let id = AttemptStep::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        tx.execute(
            "INSERT OR IGNORE INTO attempt_steps
                (id, attempt_id, step_index, kind, input_json, output_json, observation, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.as_str(),
                inputs.attempt_id.as_str(),
                inputs.step_index,
                step_kind_label(inputs.kind),
                encode_json(&inputs.input)?,
                encode_json(&inputs.output)?,
                inputs.observation,
                Timestamp::now().to_rfc3339(),
            ],
        )
        .map_err(|err| EngramError::External(format!("failed to insert attempt step: {err}")))?;
        let raw = tx
            .query_row(
                "SELECT id, attempt_id, step_index, kind, input_json, output_json, observation, created_at
                 FROM attempt_steps WHERE id = ?1",
                params![id.as_str()],
                row_to_attempt_step,
            )
            .map_err(|err| EngramError::External(format!("failed to read back attempt step: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let step = build_attempt_step(raw)?;
        self.record_audit("attempt_step.add", serde_json::to_value(&step).unwrap_or_default())?;
        Ok(step)
    }

    /// Lists every step belonging to an attempt, ordered by `step_index`.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_attempt_steps(&self, attempt_id: &ContentId) -> Result<Vec<AttemptStep>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare(
                "SELECT id, attempt_id, step_index, kind, input_json, output_json, observation, created_at
                 FROM attempt_steps WHERE attempt_id = ?1 ORDER BY step_index ASC",
            )
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![attempt_id.as_str()], row_to_attempt_step)
            .map_err(|err| EngramError::External(format!("failed to list attempt steps: {err}")))?;
        rows.map(|row| build_attempt_step(row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?))
            .collect()
    }
}

fn step_kind_label(kind: AttemptStepKind) -> &'static str {
    match kind {
        AttemptStepKind::Reflect => "reflect",
        AttemptStepKind::LearnComplete => "learn_complete",
        AttemptStepKind::Error => "error",
    }
}

fn parse_step_kind(label: &str) -> Result<AttemptStepKind, EngramError> {
    match label {
        "reflect" => Ok(AttemptStepKind::Reflect),
        "learn_complete" => Ok(AttemptStepKind::LearnComplete),
        "error" => Ok(AttemptStepKind::Error),
        other => Err(EngramError::External(format!("unknown attempt_steps.kind: {other}"))),
    }
}

type AttemptStepRow = (String, String, u32, String, String, String, String, String);

fn row_to_attempt_step(row: &Row<'_>) -> rusqlite::Result<AttemptStepRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?))
}

fn build_attempt_step(raw: AttemptStepRow) -> Result<AttemptStep, EngramError> {
    let (id, attempt_id, step_index, kind, input_json, output_json, observation, created_at) = raw;
    Ok(AttemptStep {
        id: id.try_into()?,
        attempt_id: attempt_id.try_into()?,
        step_index,
        kind: parse_step_kind(&kind)?,
        input: serde_json::from_str(&input_json).map_err(|err| EngramError::External(format!("failed to decode input: {err}")))?,
        output: serde_json::from_str(&output_json).map_err(|err| EngramError::External(format!("failed to decode output: {err}")))?,
        observation,
        created_at: Timestamp::parse(&created_at)?,
    })
}
