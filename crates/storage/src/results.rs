// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archive results: one row per (snapshot, hook name).

use crate::rows::{get_enum, get_opt_u64, get_u64, int, opt_int};
use crate::store::{Store, StoreError};
use keep_core::{ArchiveResult, ProcessId, ResultId, ResultStatus, SnapshotId};
use rusqlite::{params, OptionalExtension, Row};

const COLUMNS: &str = "id, snapshot_id, plugin, hook_name, status, start_ms, end_ms, output_str, output_size, \
                       process_id, created_at_ms, modified_at_ms";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ArchiveResult> {
    Ok(ArchiveResult {
        id: ResultId::from_string(row.get::<_, String>(0)?),
        snapshot_id: SnapshotId::from_string(row.get::<_, String>(1)?),
        plugin: row.get(2)?,
        hook_name: row.get(3)?,
        status: get_enum(row, 4, ResultStatus::parse)?,
        start_ms: get_opt_u64(row, 5)?,
        end_ms: get_opt_u64(row, 6)?,
        output_str: row.get(7)?,
        output_size: get_u64(row, 8)?,
        process_id: row.get::<_, Option<String>>(9)?.map(ProcessId::from_string),
        created_at_ms: get_u64(row, 10)?,
        modified_at_ms: get_u64(row, 11)?,
    })
}

impl Store {
    /// Idempotent: concurrent or repeated calls for the same pair yield one row.
    pub fn get_or_create_result(
        &self,
        snapshot_id: &SnapshotId,
        plugin: &str,
        hook_name: &str,
        now_ms: u64,
    ) -> Result<ArchiveResult, StoreError> {
        let fresh = ArchiveResult::new(snapshot_id.clone(), plugin, hook_name, now_ms);
        let sql = format!(
            "INSERT OR IGNORE INTO archive_results ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, '', 0, NULL, ?6, ?6)"
        );
        let select = format!("SELECT {COLUMNS} FROM archive_results WHERE snapshot_id = ?1 AND hook_name = ?2");
        self.with_conn(|c| {
            c.execute(
                &sql,
                params![
                    fresh.id.as_str(),
                    snapshot_id.as_str(),
                    plugin,
                    hook_name,
                    fresh.status.as_str(),
                    int(now_ms)
                ],
            )?;
            c.query_row(&select, params![snapshot_id.as_str(), hook_name], from_row)
        })
    }

    pub fn save_result(&self, r: &ArchiveResult) -> Result<(), StoreError> {
        let changed = self.with_conn(|c| {
            c.execute(
                "UPDATE archive_results SET status = ?2, start_ms = ?3, end_ms = ?4, output_str = ?5,
                   output_size = ?6, process_id = ?7, modified_at_ms = ?8
                 WHERE id = ?1",
                params![
                    r.id.as_str(),
                    r.status.as_str(),
                    opt_int(r.start_ms),
                    opt_int(r.end_ms),
                    r.output_str,
                    int(r.output_size),
                    r.process_id.as_ref().map(|p| p.as_str()),
                    int(r.modified_at_ms),
                ],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "archive result", id: r.id.to_string() });
        }
        Ok(())
    }

    pub fn get_result(&self, id: &str) -> Result<Option<ArchiveResult>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM archive_results WHERE id = ?1");
        self.with_conn(|c| c.query_row(&sql, params![id], from_row).optional())
    }

    pub fn results_for_snapshot(&self, snapshot_id: &str) -> Result<Vec<ArchiveResult>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM archive_results WHERE snapshot_id = ?1 ORDER BY hook_name");
        self.with_conn(|c| {
            let mut stmt = c.prepare(&sql)?;
            let rows = stmt.query_map(params![snapshot_id], from_row)?;
            rows.collect()
        })
    }

    /// Remove results that never ran. Returns how many were deleted.
    pub fn delete_queued_results(&self, snapshot_id: &str) -> Result<usize, StoreError> {
        self.with_conn(|c| {
            c.execute(
                "DELETE FROM archive_results WHERE snapshot_id = ?1 AND status = 'queued'",
                params![snapshot_id],
            )
        })
    }
}

#[cfg(test)]
#[path = "results_tests.rs"]
mod tests;
