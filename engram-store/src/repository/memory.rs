// engram-store/src/repository/memory.rs
// ============================================================================
// Module: Memory Repository
// Description: upsert/get/list/clear for ShortTermMemory and WorkingMemory,
// add/list for MemoryEvent.
// Purpose: Back the run-scoped scratch store, the project-scoped durable
// note store, and their shared provenance log (§4.J).
// Dependencies: rusqlite, engram-core, super
// ============================================================================

use engram_core::ContentId;
use engram_core::EngramError;
use engram_core::MemoryEvent;
use engram_core::MemoryEventInputs;
use engram_core::MemorySubjectKind;
use engram_core::ShortTermMemory;
use engram_core::ShortTermMemoryInputs;
use engram_core::Timestamp;
use engram_core::WorkingMemory;
use engram_core::WorkingMemoryInputs;
use engram_core::WorkingMemoryType;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde_json::Value;

use super::Repository;
use super::encode_json;
use super::lock;

// ============================================================================
// SECTION: ShortTermMemory
// ============================================================================

type ShortTermRow = (String, String, String, String, String);

fn row_to_short_term(row: &Row<'_>) -> rusqlite::Result<ShortTermRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn build_short_term(raw: ShortTermRow) -> Result<ShortTermMemory, EngramError> {
    let (id, run_id, key, value_json, created_at) = raw;
    Ok(ShortTermMemory {
        id: id.try_into()?,
        run_id: run_id.try_into()?,
        key,
        value: serde_json::from_str(&value_json).map_err(|err| EngramError::External(format!("failed to decode value: {err}")))?,
        created_at: Timestamp::parse(&created_at)?,
    })
}

const SHORT_TERM_COLUMNS: &str = "id, run_id, key, value_json, created_at";

impl Repository {
    /// Inserts or overwrites a short-term memory slot's value for
    /// `(run_id, key)`. Unlike `add`, this mutates the value of an
    /// existing slot in place.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn upsert_short_term_memory(&self, inputs: ShortTermMemoryInputs, value: Value) -> Result<ShortTermMemory, EngramError> {
        let id = ShortTermMemory::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        let value_json = encode_json(&value)?;
        tx.execute(
            "INSERT INTO short_term_memory (id, run_id, key, value_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(run_id, key) DO UPDATE SET value_json = excluded.value_json",
            params![id.as_str(), inputs.run_id.as_str(), inputs.key, value_json, Timestamp::now().to_rfc3339()],
        )
        .map_err(|err| EngramError::External(format!("failed to upsert short-term memory: {err}")))?;
        let raw = tx
            .query_row(
                &format!("SELECT {SHORT_TERM_COLUMNS} FROM short_term_memory WHERE run_id = ?1 AND key = ?2"),
                params![inputs.run_id.as_str(), inputs.key],
                row_to_short_term,
            )
            .map_err(|err| EngramError::External(format!("failed to read back short-term memory: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let memory = build_short_term(raw)?;
        memory.validate()?;
        self.record_audit("short_term_memory.upsert", serde_json::to_value(&memory).unwrap_or_default())?;
        Ok(memory)
    }

    /// Fetches a short-term memory slot by `(run_id, key)`.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn get_short_term_memory(&self, run_id: &ContentId, key: &str) -> Result<Option<ShortTermMemory>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        connection
            .query_row(
                &format!("SELECT {SHORT_TERM_COLUMNS} FROM short_term_memory WHERE run_id = ?1 AND key = ?2"),
                params![run_id.as_str(), key],
                row_to_short_term,
            )
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read short-term memory: {err}")))?
            .map(build_short_term)
            .transpose()
    }

    /// Lists every short-term memory slot belonging to a run.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_short_term_memory(&self, run_id: &ContentId) -> Result<Vec<ShortTermMemory>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare(&format!("SELECT {SHORT_TERM_COLUMNS} FROM short_term_memory WHERE run_id = ?1 ORDER BY key ASC"))
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![run_id.as_str()], row_to_short_term)
            .map_err(|err| EngramError::External(format!("failed to list short-term memory: {err}")))?;
        rows.map(|row| build_short_term(row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?)).collect()
    }

    /// Deletes every short-term memory slot belonging to a run in one
    /// statement, recording a single audit entry with the deleted count.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn clear_short_term_memory(&self, run_id: &ContentId) -> Result<usize, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let deleted = connection
            .execute("DELETE FROM short_term_memory WHERE run_id = ?1", params![run_id.as_str()])
            .map_err(|err| EngramError::External(format!("failed to clear short-term memory: {err}")))?;
        drop(connection);
        self.record_audit("short_term_memory.clear", serde_json::json!({"runId": run_id.as_str(), "deleted": deleted}))?;
        Ok(deleted)
    }
}

// ============================================================================
// SECTION: WorkingMemory
// ============================================================================

fn working_type_label(kind: WorkingMemoryType) -> &'static str {
    match kind {
        WorkingMemoryType::Decision => "decision",
        WorkingMemoryType::Invariant => "invariant",
        WorkingMemoryType::Summary => "summary",
    }
}

fn parse_working_type(label: &str) -> Result<WorkingMemoryType, EngramError> {
    match label {
        "decision" => Ok(WorkingMemoryType::Decision),
        "invariant" => Ok(WorkingMemoryType::Invariant),
        "summary" => Ok(WorkingMemoryType::Summary),
        other => Err(EngramError::External(format!("unknown working_memory.memory_type: {other}"))),
    }
}

type WorkingRow = (String, String, String, String, String, String);

fn row_to_working(row: &Row<'_>) -> rusqlite::Result<WorkingRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn build_working(raw: WorkingRow) -> Result<WorkingMemory, EngramError> {
    let (id, project_id, memory_type, content_text, provenance_json, updated_at) = raw;
    Ok(WorkingMemory {
        id: id.try_into()?,
        project_id,
        memory_type: parse_working_type(&memory_type)?,
        content_text,
        provenance: serde_json::from_str(&provenance_json)
            .map_err(|err| EngramError::External(format!("failed to decode provenance: {err}")))?,
        updated_at: Timestamp::parse(&updated_at)?,
    })
}

const WORKING_COLUMNS: &str = "id, project_id, memory_type, content_text, provenance_json, updated_at";

/// Optional narrowing applied by [`Repository::list_working_memory`].
#[derive(Debug, Clone, Default)]
pub struct WorkingMemoryFilters {
    /// Restrict to notes scoped to this project.
    pub project_id: Option<String>,
}

impl Repository {
    /// Inserts a working memory note if its derived id does not already
    /// exist, or refreshes `provenance`/`updated_at` on the existing row
    /// when it does. Content and id are coupled (see entity overview), so
    /// this never rewrites `content_text`.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error, or
    /// [`EngramError::Validation`] if the derived note fails validation.
    pub fn upsert_working_memory(&self, inputs: WorkingMemoryInputs, provenance: Value) -> Result<WorkingMemory, EngramError> {
        let id = WorkingMemory::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        let now = Timestamp::now().to_rfc3339();
        tx.execute(
            "INSERT INTO working_memory (id, project_id, memory_type, content_text, provenance_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET provenance_json = excluded.provenance_json, updated_at = excluded.updated_at",
            params![
                id.as_str(),
                inputs.project_id,
                working_type_label(inputs.memory_type),
                inputs.content_text,
                encode_json(&provenance)?,
                now,
            ],
        )
        .map_err(|err| EngramError::External(format!("failed to upsert working memory: {err}")))?;
        let raw = tx
            .query_row(&format!("SELECT {WORKING_COLUMNS} FROM working_memory WHERE id = ?1"), params![id.as_str()], row_to_working)
            .map_err(|err| EngramError::External(format!("failed to read back working memory: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let memory = build_working(raw)?;
        memory.validate()?;
        self.record_audit("working_memory.upsert", serde_json::to_value(&memory).unwrap_or_default())?;
        Ok(memory)
    }

    /// Fetches a working memory note by id.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn get_working_memory(&self, id: &ContentId) -> Result<Option<WorkingMemory>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        connection
            .query_row(&format!("SELECT {WORKING_COLUMNS} FROM working_memory WHERE id = ?1"), params![id.as_str()], row_to_working)
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read working memory: {err}")))?
            .map(build_working)
            .transpose()
    }

    /// Lists working memory notes, optionally narrowed to a project.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_working_memory(&self, filters: &WorkingMemoryFilters) -> Result<Vec<WorkingMemory>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT {WORKING_COLUMNS} FROM working_memory WHERE (?1 IS NULL OR project_id = ?1) ORDER BY updated_at ASC"
            ))
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![filters.project_id], row_to_working)
            .map_err(|err| EngramError::External(format!("failed to list working memory: {err}")))?;
        rows.map(|row| build_working(row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?)).collect()
    }
}

// ============================================================================
// SECTION: MemoryEvent
// ============================================================================

fn subject_kind_label(kind: MemorySubjectKind) -> &'static str {
    match kind {
        MemorySubjectKind::ShortTerm => "short_term",
        MemorySubjectKind::Working => "working",
        MemorySubjectKind::Insight => "insight",
    }
}

fn parse_subject_kind(label: &str) -> Result<MemorySubjectKind, EngramError> {
    match label {
        "short_term" => Ok(MemorySubjectKind::ShortTerm),
        "working" => Ok(MemorySubjectKind::Working),
        "insight" => Ok(MemorySubjectKind::Insight),
        other => Err(EngramError::External(format!("unknown memory_events.subject_kind: {other}"))),
    }
}

type MemoryEventRow = (String, String, String, String, String, String);

fn row_to_memory_event(row: &Row<'_>) -> rusqlite::Result<MemoryEventRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn build_memory_event(raw: MemoryEventRow) -> Result<MemoryEvent, EngramError> {
    let (id, subject_id, subject_kind, event, data_json, created_at) = raw;
    Ok(MemoryEvent {
        id: id.try_into()?,
        subject_id: subject_id.try_into()?,
        subject_kind: parse_subject_kind(&subject_kind)?,
        event,
        data: serde_json::from_str(&data_json).map_err(|err| EngramError::External(format!("failed to decode data: {err}")))?,
        created_at: Timestamp::parse(&created_at)?,
    })
}

const MEMORY_EVENT_COLUMNS: &str = "id, subject_id, subject_kind, event, data_json, created_at";

impl Repository {
    /// Appends a memory provenance event.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn add_memory_event(&self, inputs: MemoryEventInputs) -> Result<MemoryEvent, EngramError> {
        let id = MemoryEvent::derive_id(&inputs)?;
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        connection
            .execute(
                &format!("INSERT OR IGNORE INTO memory_events ({MEMORY_EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    id.as_str(),
                    inputs.subject_id.as_str(),
                    subject_kind_label(inputs.subject_kind),
                    inputs.event,
                    encode_json(&inputs.data)?,
                    Timestamp::now().to_rfc3339(),
                ],
            )
            .map_err(|err| EngramError::External(format!("failed to insert memory event: {err}")))?;
        let raw = connection
            .query_row(&format!("SELECT {MEMORY_EVENT_COLUMNS} FROM memory_events WHERE id = ?1"), params![id.as_str()], row_to_memory_event)
            .map_err(|err| EngramError::External(format!("failed to read back memory event: {err}")))?;
        drop(connection);
        let event = build_memory_event(raw)?;
        self.record_audit("memory_event.add", serde_json::to_value(&event).unwrap_or_default())?;
        Ok(event)
    }

    /// Lists every event recorded against a memory subject.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_memory_events(&self, subject_id: &ContentId) -> Result<Vec<MemoryEvent>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare(&format!("SELECT {MEMORY_EVENT_COLUMNS} FROM memory_events WHERE subject_id = ?1 ORDER BY created_at ASC"))
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![subject_id.as_str()], row_to_memory_event)
            .map_err(|err| EngramError::External(format!("failed to list memory events: {err}")))?;
        rows.map(|row| build_memory_event(row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?)).collect()
    }
}
