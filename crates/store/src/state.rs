//! Ingestion ledger.
//!
//! Uses SQLite to track, per store target:
//! - Which document keys have been written
//! - A fingerprint of the source record each key was written from
//! - When it was written
//!
//! Re-running ingestion consults the ledger to skip records that have not changed, which
//! saves one embedding request per movie.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use crate::error::{Result, StoreError};

/// Ledger state of a record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordState {
    /// Key has never been written to this target
    New,
    /// Key was written from an identical record
    Unchanged,
    /// Key was written from a different record
    Changed,
}

/// SQLite-backed ledger of ingested records.
pub struct IngestLedger {
    conn: Mutex<Connection>,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl IngestLedger {
    /// Create or open the ledger database in the given directory.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join("ingest_ledger.db"))?;
        Self::init(conn)
    }

    /// Ledger that lives only as long as the process.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                target TEXT NOT NULL,
                doc_key TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                ingested_at INTEGER NOT NULL,
                PRIMARY KEY (target, doc_key)
            );

            CREATE INDEX IF NOT EXISTS idx_records_target ON records(target);
        "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Local(format!("ledger lock poisoned: {}", e)))
    }

    /// Compare a record against what was last written under its key.
    pub fn record_state(&self, target: &str, key: &str, fingerprint: &str) -> Result<RecordState> {
        let conn = self.lock()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT fingerprint FROM records WHERE target = ?1 AND doc_key = ?2",
                params![target, key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match stored {
            None => RecordState::New,
            Some(f) if f == fingerprint => RecordState::Unchanged,
            Some(_) => RecordState::Changed,
        })
    }

    /// Record that `key` now holds the document built from `fingerprint`.
    pub fn mark_ingested(&self, target: &str, key: &str, fingerprint: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (target, doc_key, fingerprint, ingested_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(target, doc_key) DO UPDATE SET fingerprint = ?3, ingested_at = ?4",
            params![target, key, fingerprint, now_secs()],
        )?;
        Ok(())
    }

    /// Number of keys tracked for a target.
    pub fn record_count(&self, target: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE target = ?1",
            params![target],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Unix timestamp of the most recent write to a target.
    pub fn last_ingested_at(&self, target: &str) -> Result<Option<i64>> {
        let conn = self.lock()?;
        let ts: Option<i64> = conn.query_row(
            "SELECT MAX(ingested_at) FROM records WHERE target = ?1",
            params![target],
            |row| row.get(0),
        )?;
        Ok(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ledger_basic() {
        let tmp = TempDir::new().unwrap();
        let ledger = IngestLedger::new(tmp.path()).unwrap();

        // Initially new
        assert_eq!(ledger.record_state("t", "k1", "f1").unwrap(), RecordState::New);

        ledger.mark_ingested("t", "k1", "f1").unwrap();
        assert_eq!(ledger.record_state("t", "k1", "f1").unwrap(), RecordState::Unchanged);
        assert_eq!(ledger.record_state("t", "k1", "f2").unwrap(), RecordState::Changed);

        // Overwrite keeps one row
        ledger.mark_ingested("t", "k1", "f2").unwrap();
        assert_eq!(ledger.record_count("t").unwrap(), 1);
        assert!(ledger.last_ingested_at("t").unwrap().is_some());
    }

    #[test]
    fn test_targets_are_separate() {
        let ledger = IngestLedger::in_memory().unwrap();
        ledger.mark_ingested("couchbase:a", "k1", "f1").unwrap();

        assert_eq!(ledger.record_state("local:b", "k1", "f1").unwrap(), RecordState::New);
        assert_eq!(ledger.record_count("local:b").unwrap(), 0);
        assert_eq!(ledger.last_ingested_at("local:b").unwrap(), None);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let tmp = TempDir::new().unwrap();
        {
            let ledger = IngestLedger::new(tmp.path()).unwrap();
            ledger.mark_ingested("t", "k1", "f1").unwrap();
        }
        let ledger = IngestLedger::new(tmp.path()).unwrap();
        assert_eq!(ledger.record_state("t", "k1", "f1").unwrap(), RecordState::Unchanged);
    }
}
