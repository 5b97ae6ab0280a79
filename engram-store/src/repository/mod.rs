// engram-store/src/repository/mod.rs
// ============================================================================
// Module: Repository
// Description: The idempotent read/write surface over every entity table.
// Purpose: Give callers a single service that opens the database, keeps it
// migrated, and exposes add/get/list plus the named non-idempotent
// mutators (§4.E), auditing every successful write.
// Dependencies: rusqlite, serde_json, engram-core, crate::connection,
// crate::migrations, crate::audit
// ============================================================================

//! ## Overview
//! `Repository::open` wires a [`ConnectionRegistry`](crate::connection::ConnectionRegistry)
//! to a single writable database path, runs pending migrations, and attaches
//! an [`AuditLog`](crate::audit::AuditLog) alongside it. `add` is always
//! insert-or-ignore by content id: on conflict the existing row is returned
//! unchanged, never updated. Every successful write appends one audit
//! record. Per-entity operations live in sibling modules, each extending
//! this struct with its own `impl Repository` block.

// ============================================================================
// SECTION: Imports
// ============================================================================

mod attempt;
mod judge;
mod knowledge;
mod memory;
mod task_run;
mod trace;

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use engram_core::EngramError;
use rusqlite::Connection;
use serde_json::Value;

use crate::audit::AuditLog;
use crate::audit::AuditRecord;
use crate::connection::ConnectionRegistry;
use crate::migrations;

// ============================================================================
// SECTION: Repository
// ============================================================================

/// The store's idempotent read/write surface.
pub struct Repository {
    /// Cached connection handles.
    registry: ConnectionRegistry,
    /// Path to the writable database this repository operates on.
    db_path: PathBuf,
    /// Append-only audit mirror of every successful write.
    audit: AuditLog,
}

impl Repository {
    /// Opens (creating if absent) the database at `db_path`, applies any
    /// pending migrations, and attaches an audit log at `audit_path`.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] if the database cannot be opened
    /// or migrated.
    pub fn open(db_path: impl Into<PathBuf>, audit_path: impl Into<PathBuf>) -> Result<Self, EngramError> {
        let db_path = db_path.into();
        let registry = ConnectionRegistry::new();
        let handle = registry.get(&db_path, false)?;
        {
            let mut connection = lock(&handle)?;
            migrations::run(&mut connection)?;
        }
        Ok(Self { registry, db_path, audit: AuditLog::new(audit_path.into()) })
    }

    /// Returns the shared writable connection handle.
    fn connection(&self) -> Result<Arc<Mutex<Connection>>, EngramError> {
        self.registry.get(&self.db_path, false)
    }

    /// Records one audit entry for a successful mutation.
    fn record_audit(&self, kind: &str, data: Value) -> Result<(), EngramError> {
        self.audit.append(&AuditRecord::new(kind, data))
    }

    /// Returns the database path this repository operates on.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// Locks a connection handle, translating mutex poisoning into an
/// `EngramError`.
fn lock(handle: &Arc<Mutex<Connection>>) -> Result<MutexGuard<'_, Connection>, EngramError> {
    handle.lock().map_err(|_| EngramError::External("database connection mutex poisoned".to_owned()))
}

// ============================================================================
// SECTION: JSON Column Helpers
// ============================================================================

/// Serializes `value` to the canonical JSON text stored in a `_json` column.
fn encode_json(value: &Value) -> Result<String, EngramError> {
    serde_json::to_string(value).map_err(|err| EngramError::External(format!("failed to encode JSON column: {err}")))
}

/// Parses a `_json` column back into a [`Value`].
#[allow(dead_code)]
fn decode_json(raw: &str) -> Result<Value, EngramError> {
    serde_json::from_str(raw).map_err(|err| EngramError::External(format!("failed to decode JSON column: {err}")))
}

pub use attempt::AttemptFilters;
pub use attempt::AttemptPatch;
pub use judge::JudgeOutcomeFilters;
pub use knowledge::KnowledgeItemFilters;
pub use memory::WorkingMemoryFilters;
pub use task_run::RunFilters;
pub use trace::TraceFilters;
