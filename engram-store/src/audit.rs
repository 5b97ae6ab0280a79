// engram-store/src/audit.rs
// ============================================================================
// Module: Audit Log
// Description: Append-only newline-delimited JSON mirror of every mutation.
// Purpose: Give the store a read-oriented provenance trail independent of
// the relational schema, per §4.F.
// Dependencies: serde_json, engram-core
// ============================================================================

//! ## Overview
//! Every line is a complete JSON object `{timestamp, type, data}`. Writes
//! ensure the parent directory exists before appending; `AuditBatch`
//! accumulates many entries and flushes them as one `write` call to
//! amortize I/O, matching the batch-writer contract in §4.F. The log is
//! read-oriented: `scan`, `filter_by_type`, and `count` are its only
//! query surface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use engram_core::EngramError;
use engram_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: AuditRecord
// ============================================================================

/// One line of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the mutation was recorded.
    pub timestamp: Timestamp,
    /// The mutation type, e.g. `"knowledge_item.add"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// A JSON image of the affected row.
    pub data: Value,
}

impl AuditRecord {
    /// Builds a new record stamped with the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self { timestamp: Timestamp::now(), kind: kind.into(), data }
    }
}

// ============================================================================
// SECTION: AuditLog
// ============================================================================

/// An append-only ndjson audit channel backed by a single file.
pub struct AuditLog {
    /// Path to the log file.
    path: PathBuf,
}

impl AuditLog {
    /// Opens (without creating) an audit log at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends a single record.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on an I/O or serialization
    /// failure.
    pub fn append(&self, record: &AuditRecord) -> Result<(), EngramError> {
        self.append_batch(std::slice::from_ref(record))
    }

    /// Appends many records in a single write, amortizing I/O.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on an I/O or serialization
    /// failure.
    pub fn append_batch(&self, records: &[AuditRecord]) -> Result<(), EngramError> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|err| EngramError::External(format!("failed to create {}: {err}", parent.display())))?;
            }
        }
        let mut buffer = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|err| EngramError::External(format!("failed to serialize audit record: {err}")))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| EngramError::External(format!("failed to open audit log {}: {err}", self.path.display())))?;
        file.write_all(buffer.as_bytes())
            .map_err(|err| EngramError::External(format!("failed to append to audit log: {err}")))?;
        Ok(())
    }

    /// Reads every record in file order. Returns an empty vector if the
    /// file does not exist yet.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on an I/O or parse failure.
    pub fn scan(&self) -> Result<Vec<AuditRecord>, EngramError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)
            .map_err(|err| EngramError::External(format!("failed to open audit log {}: {err}", self.path.display())))?;
        std::io::BufReader::new(file)
            .lines()
            .filter(|line| line.as_ref().is_ok_and(|line| !line.trim().is_empty()))
            .map(|line| {
                let line = line.map_err(|err| EngramError::External(format!("failed to read audit log: {err}")))?;
                serde_json::from_str(&line)
                    .map_err(|err| EngramError::External(format!("failed to parse audit record: {err}")))
            })
            .collect()
    }

    /// Returns every record whose `type` equals `kind`.
    ///
    /// # Errors
    /// See [`AuditLog::scan`].
    pub fn filter_by_type(&self, kind: &str) -> Result<Vec<AuditRecord>, EngramError> {
        Ok(self.scan()?.into_iter().filter(|record| record.kind == kind).collect())
    }

    /// Returns the total number of records in the log.
    ///
    /// # Errors
    /// See [`AuditLog::scan`].
    pub fn count(&self) -> Result<usize, EngramError> {
        Ok(self.scan()?.len())
    }

    /// Returns the log's file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn append_and_scan_round_trips() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("snapshots").join("audit.ndjson"));
        log.append(&AuditRecord::new("knowledge_item.add", json!({"id": "abc"}))).unwrap();
        log.append(&AuditRecord::new("insight.add", json!({"id": "def"}))).unwrap();
        let records = log.scan().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, "knowledge_item.add");
    }

    #[test]
    fn filter_by_type_only_returns_matching_records() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.ndjson"));
        log.append_batch(&[
            AuditRecord::new("trace.add", json!({})),
            AuditRecord::new("insight.add", json!({})),
            AuditRecord::new("trace.add", json!({})),
        ])
        .unwrap();
        assert_eq!(log.filter_by_type("trace.add").unwrap().len(), 2);
        assert_eq!(log.count().unwrap(), 3);
    }

    #[test]
    fn scan_on_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("nope.ndjson"));
        assert!(log.scan().unwrap().is_empty());
    }
}
