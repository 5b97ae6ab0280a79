// engram-store/src/migrations.rs
// ============================================================================
// Module: Migration Engine
// Description: Ordered, self-recording schema evolution.
// Purpose: Apply pending migrations in a transaction each and record the
// applied version, per §4.D.
// Dependencies: rusqlite, engram-core
// ============================================================================

//! ## Overview
//! Migrations are additive-only: once a migration ships, its script is
//! never edited. `run` reads the current version from
//! `schema_version(version, applied_at)`, applies every pending migration
//! in ascending order inside its own transaction, and returns
//! `{applied, current}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use engram_core::EngramError;
use engram_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use tracing::debug;

// ============================================================================
// SECTION: Migration Table
// ============================================================================

/// One ordered, numbered schema migration.
struct Migration {
    /// Monotonically increasing version number.
    version: i64,
    /// Human-readable name, for diagnostics only.
    name: &'static str,
    /// The SQL script to run inside the migration's transaction.
    script: &'static str,
}

/// Every known migration, in ascending version order. Never edit a
/// previously shipped entry; only append.
const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "initial_schema", script: include_str!("migrations/0001_initial.sql") },
];

/// The result of running migrations: how many were newly applied, and the
/// schema version the database is left at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationResult {
    /// Number of migrations applied during this call.
    pub applied: usize,
    /// The schema version after this call.
    pub current: i64,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Returns the current schema version, or `0` if the tracking table does
/// not exist yet.
///
/// # Errors
/// Returns [`EngramError::External`] on a database error.
pub fn current_version(connection: &Connection) -> Result<i64, EngramError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )
        .map_err(|err| EngramError::External(format!("failed to ensure schema_version table: {err}")))?;
    let version: Option<i64> = connection
        .query_row("SELECT MAX(version) FROM schema_version", params![], |row| row.get(0))
        .optional()
        .map_err(|err| EngramError::External(format!("failed to read schema_version: {err}")))?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Returns `true` if any migration newer than the current version exists.
///
/// # Errors
/// Returns [`EngramError::External`] on a database error.
pub fn needs_migration(connection: &Connection) -> Result<bool, EngramError> {
    let current = current_version(connection)?;
    let latest = MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0);
    Ok(current < latest)
}

/// Applies every migration with `version > current`, in ascending order,
/// each inside its own transaction.
///
/// # Errors
/// Returns [`EngramError::External`] if a migration's script fails.
pub fn run(connection: &mut Connection) -> Result<MigrationResult, EngramError> {
    let current = current_version(connection)?;
    let mut applied = 0usize;
    let mut version = current;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start migration transaction: {err}")))?;
        tx.execute_batch(migration.script)
            .map_err(|err| EngramError::External(format!("migration {} failed: {err}", migration.name)))?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            params![migration.version, Timestamp::now().to_rfc3339()],
        )
        .map_err(|err| EngramError::External(format!("failed to record migration {}: {err}", migration.name)))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit migration {}: {err}", migration.name)))?;
        debug!(version = migration.version, name = migration.name, "applied migration");
        applied += 1;
        version = migration.version;
    }
    Ok(MigrationResult { applied, current: version })
}
