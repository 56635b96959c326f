// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::rows::{get_enum, get_json, get_u64, int, to_json};
use crate::store::{Store, StoreError};
use keep_core::{ConfigMap, CrawlId, JobStatus, Snapshot, SnapshotId};
use rusqlite::{params, OptionalExtension, Row};

const COLUMNS: &str = "id, crawl_id, url, depth, status, retry_at_ms, config, created_at_ms, modified_at_ms";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: SnapshotId::from_string(row.get::<_, String>(0)?),
        crawl_id: CrawlId::from_string(row.get::<_, String>(1)?),
        url: row.get(2)?,
        depth: row.get(3)?,
        status: get_enum(row, 4, JobStatus::parse)?,
        retry_at_ms: get_u64(row, 5)?,
        config: get_json(row, 6)?,
        created_at_ms: get_u64(row, 7)?,
        modified_at_ms: get_u64(row, 8)?,
    })
}

impl Store {
    /// Insert unless the crawl already has a snapshot for this URL. Returns
    /// the stored snapshot either way and whether it was newly created.
    pub fn get_or_create_snapshot(&self, snapshot: &Snapshot) -> Result<(Snapshot, bool), StoreError> {
        let sql = format!("INSERT OR IGNORE INTO snapshots ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)");
        let created = self.with_conn(|c| {
            c.execute(
                &sql,
                params![
                    snapshot.id.as_str(),
                    snapshot.crawl_id.as_str(),
                    snapshot.url,
                    snapshot.depth,
                    snapshot.status.as_str(),
                    int(snapshot.retry_at_ms),
                    to_json(&snapshot.config)?,
                    int(snapshot.created_at_ms),
                    int(snapshot.modified_at_ms),
                ],
            )
        })? == 1;
        let stored = self.snapshot_by_url(&snapshot.crawl_id, &snapshot.url)?.ok_or_else(|| StoreError::NotFound {
            kind: "snapshot",
            id: format!("{} {}", snapshot.crawl_id, snapshot.url),
        })?;
        Ok((stored, created))
    }

    pub fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM snapshots WHERE id = ?1");
        self.with_conn(|c| c.query_row(&sql, params![id], from_row).optional())
    }

    pub fn require_snapshot(&self, id: &str) -> Result<Snapshot, StoreError> {
        self.get_snapshot(id)?.ok_or_else(|| StoreError::NotFound { kind: "snapshot", id: id.to_string() })
    }

    pub fn snapshot_by_url(&self, crawl_id: &str, url: &str) -> Result<Option<Snapshot>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM snapshots WHERE crawl_id = ?1 AND url = ?2");
        self.with_conn(|c| c.query_row(&sql, params![crawl_id, url], from_row).optional())
    }

    pub fn snapshots_for_crawl(&self, crawl_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM snapshots WHERE crawl_id = ?1 ORDER BY depth, created_at_ms, id");
        self.with_conn(|c| {
            let mut stmt = c.prepare(&sql)?;
            let rows = stmt.query_map(params![crawl_id], from_row)?;
            rows.collect()
        })
    }

    pub fn set_snapshot_status(&self, id: &str, status: JobStatus, now_ms: u64) -> Result<(), StoreError> {
        let changed = self.with_conn(|c| {
            c.execute(
                "UPDATE snapshots SET status = ?2, modified_at_ms = ?3 WHERE id = ?1",
                params![id, status.as_str(), int(now_ms)],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "snapshot", id: id.to_string() });
        }
        Ok(())
    }

    pub fn set_snapshot_config(&self, id: &str, config: &ConfigMap, now_ms: u64) -> Result<(), StoreError> {
        self.with_conn(|c| {
            c.execute(
                "UPDATE snapshots SET config = ?2, modified_at_ms = ?3 WHERE id = ?1",
                params![id, to_json(config)?, int(now_ms)],
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "snapshots_tests.rs"]
mod tests;
