// engram-store/src/repository/task_run.rs
// ============================================================================
// Module: Task & Run Repository
// Description: add/get/list for Task and Run.
// Purpose: Back the bBoN orchestrator's work submission and fan-out
// bookkeeping (§4.M).
// Dependencies: rusqlite, engram-core, super
// ============================================================================

use engram_core::ContentId;
use engram_core::EngramError;
use engram_core::Run;
use engram_core::RunInputs;
use engram_core::Task;
use engram_core::TaskInputs;
use engram_core::Timestamp;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use super::Repository;
use super::encode_json;
use super::lock;

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<(String, Option<String>, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn build_task(raw: (String, Option<String>, String, String)) -> Result<Task, EngramError> {
    let (id, subject_id, spec_json, created_at) = raw;
    Ok(Task {
        id: id.try_into()?,
        subject_id,
        spec: serde_json::from_str(&spec_json).map_err(|err| EngramError::External(format!("failed to decode spec: {err}")))?,
        created_at: Timestamp::parse(&created_at)?,
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<(String, String, u32, i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn build_run(raw: (String, String, u32, i64, String, String)) -> Result<Run, EngramError> {
    let (id, task_id, n, seed, config_json, created_at) = raw;
    Ok(Run {
        id: id.try_into()?,
        task_id: task_id.try_into()?,
        n,
        seed,
        config: serde_json::from_str(&config_json).map_err(|err| EngramError::External(format!("failed to decode config: {err}")))?,
        created_at: Timestamp::parse(&created_at)?,
    })
}

/// Optional narrowing applied by [`Repository::list_runs`].
#[derive(Debug, Clone, Default)]
pub struct RunFilters {
    /// Restrict to runs belonging to this task.
    pub task_id: Option<ContentId>,
}

impl Repository {
    /// Inserts a task if it does not already exist, returning the stored
    /// row either way.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error, or
    /// [`EngramError::Validation`] if the derived task fails validation.
    pub fn add_task(&self, inputs: TaskInputs) -> Result<Task, EngramError> {
        let id = Task::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        tx.execute(
            "INSERT OR IGNORE INTO tasks (id, subject_id, spec_json, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.as_str(), inputs.subject_id, encode_json(&inputs.spec)?, Timestamp::now().to_rfc3339()],
        )
        .map_err(|err| EngramError::External(format!("failed to insert task: {err}")))?;
        let raw = tx
            .query_row("SELECT id, subject_id, spec_json, created_at FROM tasks WHERE id = ?1", params![id.as_str()], row_to_task)
            .map_err(|err| EngramError::External(format!("failed to read back task: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let task = build_task(raw)?;
        task.validate()?;
        self.record_audit("task.add", serde_json::to_value(&task).unwrap_or_default())?;
        Ok(task)
    }

    /// Fetches a task by id.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn get_task(&self, id: &ContentId) -> Result<Option<Task>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        connection
            .query_row("SELECT id, subject_id, spec_json, created_at FROM tasks WHERE id = ?1", params![id.as_str()], row_to_task)
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read task: {err}")))?
            .map(build_task)
            .transpose()
    }

    /// Lists every task, oldest first.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_tasks(&self) -> Result<Vec<Task>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare("SELECT id, subject_id, spec_json, created_at FROM tasks ORDER BY created_at ASC")
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![], row_to_task)
            .map_err(|err| EngramError::External(format!("failed to list tasks: {err}")))?;
        rows.map(|row| build_task(row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?)).collect()
    }

    /// Inserts a run if it does not already exist, returning the stored row
    /// either way.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error, or
    /// [`EngramError::Validation`] if the derived run fails validation.
    pub fn add_run(&self, inputs: RunInputs) -> Result<Run, EngramError> {
        let id = Run::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        tx.execute(
            "INSERT OR IGNORE INTO runs (id, task_id, n, seed, config_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_str(),
                inputs.task_id.as_str(),
                inputs.n,
                inputs.seed,
                encode_json(&inputs.config)?,
                Timestamp::now().to_rfc3339(),
            ],
        )
        .map_err(|err| EngramError::External(format!("failed to insert run: {err}")))?;
        let raw = tx
            .query_row(
                "SELECT id, task_id, n, seed, config_json, created_at FROM runs WHERE id = ?1",
                params![id.as_str()],
                row_to_run,
            )
            .map_err(|err| EngramError::External(format!("failed to read back run: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let run = build_run(raw)?;
        run.validate()?;
        self.record_audit("run.add", serde_json::to_value(&run).unwrap_or_default())?;
        Ok(run)
    }

    /// Fetches a run by id.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn get_run(&self, id: &ContentId) -> Result<Option<Run>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        connection
            .query_row(
                "SELECT id, task_id, n, seed, config_json, created_at FROM runs WHERE id = ?1",
                params![id.as_str()],
                row_to_run,
            )
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read run: {err}")))?
            .map(build_run)
            .transpose()
    }

    /// Lists runs, optionally narrowed to one task.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_runs(&self, filters: &RunFilters) -> Result<Vec<Run>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare(
                "SELECT id, task_id, n, seed, config_json, created_at FROM runs
                 WHERE (?1 IS NULL OR task_id = ?1) ORDER BY created_at ASC",
            )
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![filters.task_id.as_ref().map(ContentId::as_str)], row_to_run)
            .map_err(|err| EngramError::External(format!("failed to list runs: {err}")))?;
        rows.map(|row| build_run(row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?)).collect()
    }
}
