// engram-store/src/connection.rs
// ============================================================================
// Module: Connection Registry
// Description: Process-scoped SQLite connection registry with durability
// pragmas applied on open.
// Purpose: Give callers a single cached handle per (path, readonly) pair,
// matching the writer-serializing, many-reader scheduling model (§5).
// Dependencies: rusqlite, engram-core
// ============================================================================

//! ## Overview
//! Rather than the module-level mutable map the storage engine's donor
//! pattern uses, the registry here is an explicit service: a
//! `ConnectionRegistry` value owned by whatever scope owns the
//! `Repository` (see `§9` design note: "global connection registry becomes
//! a process-scoped service"). `get` returns a cached handle for repeat
//! callers; `close_all` tears every handle down.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use engram_core::EngramError;
use rusqlite::Connection;
use rusqlite::OpenFlags;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Busy timeout applied to every writable connection (§4.C).
const BUSY_TIMEOUT_MS: u64 = 5_000;
/// WAL auto-checkpoint threshold, in pages (§4.C).
const WAL_AUTOCHECKPOINT_PAGES: i64 = 1_000;
/// Page cache budget, in KiB (negative `cache_size` pragma value means KiB).
const CACHE_SIZE_KIB: i64 = -64_000;

/// A handle registry key: the database path plus whether it was opened
/// read-only.
type RegistryKey = (PathBuf, bool);

// ============================================================================
// SECTION: ConnectionRegistry
// ============================================================================

/// A process-scoped cache of open SQLite connections.
pub struct ConnectionRegistry {
    /// Cached handles, keyed by `(path, readonly)`.
    handles: Mutex<HashMap<RegistryKey, Arc<Mutex<Connection>>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { handles: Mutex::new(HashMap::new()) }
    }

    /// Returns the cached handle for `(path, readonly)`, opening and
    /// caching a new one if none exists yet.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] if the connection cannot be
    /// opened or its pragmas cannot be applied.
    pub fn get(&self, path: &Path, readonly: bool) -> Result<Arc<Mutex<Connection>>, EngramError> {
        let key = (path.to_path_buf(), readonly);
        let mut handles = handles_lock(&self.handles)?;
        if let Some(existing) = handles.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let connection = open(path, readonly)?;
        let handle = Arc::new(Mutex::new(connection));
        handles.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Closes every cached handle and empties the registry.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] if the registry's lock is
    /// poisoned.
    pub fn close_all(&self) -> Result<(), EngramError> {
        let mut handles = handles_lock(&self.handles)?;
        handles.clear();
        Ok(())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Locks the handle map, translating mutex poisoning into an `EngramError`.
fn handles_lock(
    handles: &Mutex<HashMap<RegistryKey, Arc<Mutex<Connection>>>>,
) -> Result<std::sync::MutexGuard<'_, HashMap<RegistryKey, Arc<Mutex<Connection>>>>, EngramError> {
    handles.lock().map_err(|_| EngramError::External("connection registry mutex poisoned".to_owned()))
}

// ============================================================================
// SECTION: Opening
// ============================================================================

/// Opens a connection at `path`, creating parent directories for writable
/// opens and applying the durability pragmas (§4.C). Read-only opens skip
/// every writable pragma.
fn open(path: &Path, readonly: bool) -> Result<Connection, EngramError> {
    if readonly {
        let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| EngramError::External(format!("failed to open database read-only: {err}")))?;
        connection
            .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(|err| EngramError::External(format!("failed to set busy timeout: {err}")))?;
        return Ok(connection);
    }

    ensure_parent_dir(path)?;
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags)
        .map_err(|err| EngramError::External(format!("failed to open database: {err}")))?;
    apply_writable_pragmas(&connection)?;
    Ok(connection)
}

/// Applies the pragmas required of every writable connection (§4.C).
fn apply_writable_pragmas(connection: &Connection) -> Result<(), EngramError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| EngramError::External(format!("failed to enable foreign keys: {err}")))?;
    connection
        .execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(|err| EngramError::External(format!("failed to enable WAL: {err}")))?;
    connection
        .execute_batch("PRAGMA synchronous = NORMAL;")
        .map_err(|err| EngramError::External(format!("failed to set synchronous mode: {err}")))?;
    connection
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
        .map_err(|err| EngramError::External(format!("failed to set busy timeout: {err}")))?;
    connection
        .execute_batch(&format!("PRAGMA wal_autocheckpoint = {WAL_AUTOCHECKPOINT_PAGES};"))
        .map_err(|err| EngramError::External(format!("failed to set wal_autocheckpoint: {err}")))?;
    connection
        .execute_batch(&format!("PRAGMA cache_size = {CACHE_SIZE_KIB};"))
        .map_err(|err| EngramError::External(format!("failed to set cache_size: {err}")))?;
    connection
        .execute_batch("PRAGMA temp_store = MEMORY;")
        .map_err(|err| EngramError::External(format!("failed to set temp_store: {err}")))?;
    Ok(())
}

/// Creates the parent directory of `path` if it does not already exist.
fn ensure_parent_dir(path: &Path) -> Result<(), EngramError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|err| EngramError::External(format!("failed to create {}: {err}", parent.display())))?;
        }
    }
    Ok(())
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
    fn repeat_get_returns_cached_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("engram.db");
        let registry = ConnectionRegistry::new();
        let first = registry.get(&path, false).unwrap();
        let second = registry.get(&path, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn close_all_empties_the_registry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engram.db");
        let registry = ConnectionRegistry::new();
        let first = registry.get(&path, false).unwrap();
        registry.close_all().unwrap();
        let second = registry.get(&path, false).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
