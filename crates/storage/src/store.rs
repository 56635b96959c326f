// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection handle and job-generic queries.

use crate::migration::{self, MigrationError};
use keep_core::{JobKind, MachineId};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// How long a connection waits on another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("failed to create datastore directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

/// Shared handle to the datastore. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// Claimable work for the orchestrator's queue scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub crawls: u64,
    pub snapshots: u64,
    pub binaries: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.crawls + self.snapshots + self.binaries
    }
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
        migration::migrate(&mut conn, now_ms)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        self.with_conn(|c| migration::current_version(c))
    }

    /// Atomically claim a job: move `retry_at` from the value the caller saw
    /// to `lockout_until_ms`. Only one of any number of concurrent callers
    /// that saw the same value gets `true`.
    pub fn claim(
        &self,
        kind: JobKind,
        id: &str,
        seen_retry_at_ms: u64,
        lockout_until_ms: u64,
        now_ms: u64,
    ) -> Result<bool, StoreError> {
        let table = job_table(kind);
        let sql = format!("UPDATE {table} SET retry_at_ms = ?3, modified_at_ms = ?4 WHERE id = ?1 AND retry_at_ms = ?2");
        let changed = self.with_conn(|c| {
            c.execute(&sql, params![id, seen_retry_at_ms as i64, lockout_until_ms as i64, now_ms as i64])
        })?;
        Ok(changed == 1)
    }

    /// Reschedule a job. Used to release a claim or to back off.
    pub fn set_retry_at(&self, kind: JobKind, id: &str, retry_at_ms: u64, now_ms: u64) -> Result<(), StoreError> {
        let table = job_table(kind);
        let sql = format!("UPDATE {table} SET retry_at_ms = ?2, modified_at_ms = ?3 WHERE id = ?1");
        let changed = self.with_conn(|c| c.execute(&sql, params![id, retry_at_ms as i64, now_ms as i64]))?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: kind.as_str(), id: id.to_string() });
        }
        Ok(())
    }

    /// Current `retry_at` of a job, as read before a claim.
    pub fn retry_at(&self, kind: JobKind, id: &str) -> Result<Option<u64>, StoreError> {
        let table = job_table(kind);
        let sql = format!("SELECT retry_at_ms FROM {table} WHERE id = ?1");
        let value: Option<i64> = self.with_conn(|c| c.query_row(&sql, params![id], |r| r.get(0)).optional())?;
        Ok(value.map(|v| v as u64))
    }

    /// Work claimable at `now_ms`, optionally limited to one crawl.
    ///
    /// Unfinished jobs whose lock has elapsed count: a `started` job past its
    /// lockout was left behind by a dead worker.
    pub fn queue_counts(&self, machine: &MachineId, now_ms: u64, crawl: Option<&str>) -> Result<QueueCounts, StoreError> {
        self.with_conn(|c| {
            let crawls: i64 = c.query_row(
                "SELECT COUNT(*) FROM crawls
                 WHERE status NOT IN ('sealed', 'failed') AND retry_at_ms <= ?1 AND (?2 IS NULL OR id = ?2)",
                params![now_ms as i64, crawl],
                |r| r.get(0),
            )?;
            let snapshots: i64 = c.query_row(
                "SELECT COUNT(*) FROM snapshots
                 WHERE status NOT IN ('sealed', 'failed') AND retry_at_ms <= ?1 AND (?2 IS NULL OR crawl_id = ?2)",
                params![now_ms as i64, crawl],
                |r| r.get(0),
            )?;
            let binaries: i64 = c.query_row(
                "SELECT COUNT(*) FROM binaries WHERE machine_id = ?1 AND status = 'queued' AND retry_at_ms <= ?2",
                params![machine.as_str(), now_ms as i64],
                |r| r.get(0),
            )?;
            Ok(QueueCounts { crawls: crawls as u64, snapshots: snapshots as u64, binaries: binaries as u64 })
        })
    }

    /// Whether a queued or backed-off job is scheduled after `now_ms`.
    ///
    /// Started jobs are excluded: their `retry_at` is a claim lock, not a
    /// schedule.
    pub fn has_future_work(&self, machine: &MachineId, now_ms: u64, crawl: Option<&str>) -> Result<bool, StoreError> {
        self.with_conn(|c| {
            c.query_row(
                "SELECT EXISTS (
                   SELECT 1 FROM crawls WHERE status IN ('queued', 'backoff') AND retry_at_ms > ?1
                     AND (?3 IS NULL OR id = ?3)
                   UNION ALL
                   SELECT 1 FROM snapshots WHERE status IN ('queued', 'backoff') AND retry_at_ms > ?1
                     AND (?3 IS NULL OR crawl_id = ?3)
                   UNION ALL
                   SELECT 1 FROM binaries WHERE machine_id = ?2 AND status = 'queued' AND retry_at_ms > ?1
                 )",
                params![now_ms as i64, machine.as_str(), crawl],
                |r| r.get(0),
            )
        })
    }

    /// Row counts per status for one job table.
    pub fn status_counts(&self, kind: JobKind) -> Result<Vec<(String, u64)>, StoreError> {
        let table = job_table(kind);
        let sql = format!("SELECT status, COUNT(*) FROM {table} GROUP BY status ORDER BY status");
        self.with_conn(|c| {
            let mut stmt = c.prepare(&sql)?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?;
            rows.collect()
        })
    }
}

fn job_table(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Crawl => "crawls",
        JobKind::Snapshot => "snapshots",
        JobKind::Binary => "binaries",
        JobKind::ArchiveResult => "archive_results",
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
