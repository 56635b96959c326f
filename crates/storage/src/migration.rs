// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema migrations.
//!
//! Applied versions are recorded in `schema_migrations`; each migration runs
//! once, in order, inside its own transaction.

use rusqlite::{params, Connection, TransactionBehavior};
use thiserror::Error;

pub const SCHEMA_VERSION: i64 = 2;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("datastore schema v{0} is newer than supported v{1}")]
    TooNew(i64, i64),
    #[error("migration v{version} ({name}) failed: {source}")]
    Failed {
        version: i64,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "baseline_tables",
        sql: r#"
        CREATE TABLE processes (
          id TEXT PRIMARY KEY,
          machine_id TEXT NOT NULL,
          parent_id TEXT NULL REFERENCES processes(id) ON DELETE SET NULL,
          kind TEXT NOT NULL,
          worker_kind TEXT NULL,
          cmd TEXT NOT NULL,
          pwd TEXT NOT NULL,
          env TEXT NOT NULL,
          timeout_secs INTEGER NOT NULL,
          status TEXT NOT NULL,
          pid INTEGER NULL,
          exit_code INTEGER NULL,
          stdout TEXT NOT NULL DEFAULT '',
          stderr TEXT NOT NULL DEFAULT '',
          started_at_ms INTEGER NULL,
          ended_at_ms INTEGER NULL,
          created_at_ms INTEGER NOT NULL,
          modified_at_ms INTEGER NOT NULL
        );
        CREATE INDEX idx_processes_status ON processes(status, kind);
        CREATE INDEX idx_processes_parent ON processes(parent_id);

        CREATE TABLE crawls (
          id TEXT PRIMARY KEY,
          urls TEXT NOT NULL,
          max_depth INTEGER NOT NULL,
          status TEXT NOT NULL,
          retry_at_ms INTEGER NOT NULL,
          config TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          modified_at_ms INTEGER NOT NULL
        );
        CREATE INDEX idx_crawls_queue ON crawls(status, retry_at_ms);

        CREATE TABLE snapshots (
          id TEXT PRIMARY KEY,
          crawl_id TEXT NOT NULL REFERENCES crawls(id) ON DELETE CASCADE,
          url TEXT NOT NULL,
          depth INTEGER NOT NULL,
          status TEXT NOT NULL,
          retry_at_ms INTEGER NOT NULL,
          config TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          modified_at_ms INTEGER NOT NULL,
          UNIQUE(crawl_id, url)
        );
        CREATE INDEX idx_snapshots_queue ON snapshots(status, retry_at_ms);

        CREATE TABLE binaries (
          id TEXT PRIMARY KEY,
          machine_id TEXT NOT NULL,
          name TEXT NOT NULL,
          binproviders TEXT NOT NULL,
          overrides TEXT NOT NULL,
          status TEXT NOT NULL,
          retry_at_ms INTEGER NOT NULL,
          abspath TEXT NULL,
          version TEXT NULL,
          sha256 TEXT NULL,
          binprovider TEXT NULL,
          created_at_ms INTEGER NOT NULL,
          modified_at_ms INTEGER NOT NULL,
          UNIQUE(machine_id, name)
        );
        "#,
    },
    Migration {
        version: 2,
        name: "archive_results",
        sql: r#"
        CREATE TABLE archive_results (
          id TEXT PRIMARY KEY,
          snapshot_id TEXT NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
          plugin TEXT NOT NULL,
          hook_name TEXT NOT NULL,
          status TEXT NOT NULL,
          start_ms INTEGER NULL,
          end_ms INTEGER NULL,
          output_str TEXT NOT NULL DEFAULT '',
          output_size INTEGER NOT NULL DEFAULT 0,
          process_id TEXT NULL REFERENCES processes(id) ON DELETE SET NULL,
          created_at_ms INTEGER NOT NULL,
          modified_at_ms INTEGER NOT NULL,
          UNIQUE(snapshot_id, hook_name)
        );
        "#,
    },
];

pub(crate) fn current_version(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |r| r.get(0))
}

/// Bring the schema up to [`SCHEMA_VERSION`].
pub(crate) fn migrate(conn: &mut Connection, now_ms: u64) -> Result<i64, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
           version INTEGER PRIMARY KEY,
           name TEXT NOT NULL,
           applied_at_ms INTEGER NOT NULL
         );",
    )?;
    let current = current_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(MigrationError::TooNew(current, SCHEMA_VERSION));
    }
    for m in MIGRATIONS.iter().filter(|m| m.version > current) {
        // Another process may be migrating the same file; re-check under the write lock.
        let apply = |conn: &mut Connection| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if current_version(&tx)? >= m.version {
                return Ok(false);
            }
            tx.execute_batch(m.sql)?;
            tx.execute(
                "INSERT INTO schema_migrations(version, name, applied_at_ms) VALUES (?1, ?2, ?3)",
                params![m.version, m.name, now_ms as i64],
            )?;
            tx.commit()?;
            Ok(true)
        };
        let applied =
            apply(conn).map_err(|source| MigrationError::Failed { version: m.version, name: m.name, source })?;
        if applied {
            tracing::info!(version = m.version, name = m.name, "applied schema migration");
        }
    }
    Ok(SCHEMA_VERSION)
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
