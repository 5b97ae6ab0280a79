// engram-cli/src/commands/core.rs
// ============================================================================
// Module: Core Verb Commands
// Description: init, doctor, capture, reflect, curate, apply, learn.
// Purpose: Wire the CLI's argument surface onto `engram-learn`'s pipeline
// stages and `engram-store`'s Repository.
// Dependencies: engram-core, engram-store, engram-learn
// ============================================================================

//! ## Overview
//! Every function here returns the JSON value the envelope will carry as
//! `data`; callers convert lower-crate results manually rather than
//! deriving `Serialize` on those crates' own result types, since those
//! types are internal to their crates and the CLI's rendering is a
//! presentation concern, not a data-model one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::io::IsTerminal;
use std::path::Path;

use engram_learn::apply;
use engram_learn::capture;
use engram_learn::curate;
use engram_learn::orchestrator;
use engram_learn::reflect as reflect_mod;
use engram_store::Repository;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use serde_json::Value;
use serde_json::json;

use crate::error::CliError;

// ============================================================================
// SECTION: Init
// ============================================================================

/// Creates `.engram/`, migrates the database to current, and seeds the
/// guidance document's marker region if it does not already exist.
pub fn init(db_path: &Path, audit_path: &Path, document_path: &Path) -> Result<Value, CliError> {
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).map_err(|err| CliError::Config(format!("failed to create {}: {err}", parent.display())))?;
    }
    let repository = Repository::open(db_path, audit_path)?;

    let document_created = if document_path.exists() {
        false
    } else {
        let seed = format!("{}\n{}\n", apply::BEGIN_MARKER, apply::END_MARKER);
        fs::write(document_path, seed).map_err(|err| CliError::Config(format!("failed to create {}: {err}", document_path.display())))?;
        true
    };

    Ok(json!({
        "dbPath": repository.db_path().display().to_string(),
        "documentPath": document_path.display().to_string(),
        "documentCreated": document_created,
    }))
}

// ============================================================================
// SECTION: Doctor
// ============================================================================

/// Read-only health check: database presence and migration status, and
/// guidance document marker presence, without mutating either.
pub fn doctor(db_path: &Path, document_path: &Path) -> Result<Value, CliError> {
    let (db_openable, migration_needed) = match Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(connection) => (true, engram_store::migrations::needs_migration(&connection)?),
        Err(_) => (false, false),
    };

    let (document_present, markers_ok) = match fs::read_to_string(document_path) {
        Ok(text) => {
            let begin = text.find(apply::BEGIN_MARKER);
            let end = text.find(apply::END_MARKER);
            let ok = matches!((begin, end), (Some(begin), Some(end)) if begin <= end);
            (true, ok)
        }
        Err(_) => (false, false),
    };

    let healthy = db_openable && !migration_needed && document_present && markers_ok;
    Ok(json!({
        "healthy": healthy,
        "dbPath": db_path.display().to_string(),
        "dbOpenable": db_openable,
        "migrationNeeded": migration_needed,
        "documentPath": document_path.display().to_string(),
        "documentPresent": document_present,
        "markersOk": markers_ok,
    }))
}

// ============================================================================
// SECTION: Capture
// ============================================================================

/// Resolves a trace payload from `file`, stdin, or `literal` (in that
/// order), and writes it through the repository.
pub fn capture(repository: &Repository, file: Option<&Path>, literal: Option<&str>) -> Result<Value, CliError> {
    let stdin = io::stdin();
    let mut stdin_reader = if file.is_none() && !stdin.is_terminal() { Some(stdin) } else { None };
    let reader: Option<&mut dyn io::Read> = stdin_reader.as_mut().map(|handle| handle as &mut dyn io::Read);

    let payload = capture::resolve_capture_payload(file, reader, literal)?;
    let trace = capture::capture(repository, &payload)?;
    Ok(json!({"traceId": trace.id, "subjectId": trace.subject_id, "outcome": trace.outcome}))
}

// ============================================================================
// SECTION: Reflect
// ============================================================================

/// Groups failed traces into insight candidates.
pub fn reflect(repository: &Repository) -> Result<Value, CliError> {
    let insights = reflect_mod::reflect(repository)?;
    Ok(json!({"insightsCreated": insights.len(), "insights": insights}))
}

// ============================================================================
// SECTION: Curate
// ============================================================================

/// Promotes every insight with `confidence >= tau` into durable knowledge.
pub fn curate(repository: &Repository, tau: f64) -> Result<Value, CliError> {
    let result = curate::curate(repository, tau)?;
    Ok(json!({"promoted": result.promoted, "deduplicated": result.deduplicated}))
}

// ============================================================================
// SECTION: Apply
// ============================================================================

/// Renders the current knowledge and working-memory sets into the
/// guidance document's marker region.
pub fn apply(repository: &Repository, document_path: &Path, project_id: &str) -> Result<Value, CliError> {
    let result = apply::apply(repository, document_path, project_id)?;
    Ok(json!({
        "knowledgeItemCount": result.knowledge_item_count,
        "workingMemoryCount": result.working_memory_count,
        "rendered": result.rendered,
    }))
}

// ============================================================================
// SECTION: Learn
// ============================================================================

/// Runs Reflect, Curate, and Apply as one cycle.
pub fn learn(repository: &Repository, document_path: &Path, project_id: &str, tau: f64) -> Result<Value, CliError> {
    let result = orchestrator::learn(repository, document_path, project_id, tau)?;
    Ok(json!({
        "insightsCreated": result.insights_created,
        "promoted": result.curate.promoted,
        "deduplicated": result.curate.deduplicated,
        "knowledgeItemCount": result.apply.knowledge_item_count,
        "workingMemoryCount": result.apply.working_memory_count,
        "rendered": result.apply.rendered,
    }))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn init_seeds_a_guidance_document_when_absent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join(".engram/engram.db");
        let audit_path = dir.path().join(".engram/snapshots/audit.ndjson");
        let document_path = dir.path().join("AGENTS.md");

        let data = init(&db_path, &audit_path, &document_path).unwrap();
        assert_eq!(data["documentCreated"], true);
        assert!(document_path.exists());

        let data = init(&db_path, &audit_path, &document_path).unwrap();
        assert_eq!(data["documentCreated"], false);
    }

    #[test]
    fn doctor_reports_an_unhealthy_repository_before_init() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join(".engram/engram.db");
        let document_path = dir.path().join("AGENTS.md");

        let data = doctor(&db_path, &document_path).unwrap();
        assert_eq!(data["healthy"], false);
        assert_eq!(data["dbOpenable"], false);
        assert_eq!(data["documentPresent"], false);
    }

    #[test]
    fn doctor_reports_healthy_after_init() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join(".engram/engram.db");
        let audit_path = dir.path().join(".engram/snapshots/audit.ndjson");
        let document_path = dir.path().join("AGENTS.md");
        init(&db_path, &audit_path, &document_path).unwrap();

        let data = doctor(&db_path, &document_path).unwrap();
        assert_eq!(data["healthy"], true);
        assert_eq!(data["migrationNeeded"], false);
    }

    #[test]
    fn capture_resolves_a_literal_payload() {
        let dir = tempdir().unwrap();
        let repository = Repository::open(dir.path().join("engram.db"), dir.path().join("audit.ndjson")).unwrap();
        let payload = r#"{"subjectId":"agent-1","executions":[],"outcome":"success"}"#;
        let data = capture(&repository, None, Some(payload)).unwrap();
        assert_eq!(data["subjectId"], "agent-1");
    }
}
