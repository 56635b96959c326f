// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::rows::{get_enum, get_json, get_u64, int, to_json};
use crate::store::{Store, StoreError};
use keep_core::{Crawl, CrawlId, JobStatus};
use rusqlite::{params, OptionalExtension, Row};

const COLUMNS: &str = "id, urls, max_depth, status, retry_at_ms, config, created_at_ms, modified_at_ms";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Crawl> {
    Ok(Crawl {
        id: CrawlId::from_string(row.get::<_, String>(0)?),
        urls: row.get(1)?,
        max_depth: row.get(2)?,
        status: get_enum(row, 3, JobStatus::parse)?,
        retry_at_ms: get_u64(row, 4)?,
        config: get_json(row, 5)?,
        created_at_ms: get_u64(row, 6)?,
        modified_at_ms: get_u64(row, 7)?,
    })
}

impl Store {
    pub fn insert_crawl(&self, crawl: &Crawl) -> Result<(), StoreError> {
        let sql = format!("INSERT INTO crawls ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)");
        self.with_conn(|c| {
            c.execute(
                &sql,
                params![
                    crawl.id.as_str(),
                    crawl.urls,
                    crawl.max_depth,
                    crawl.status.as_str(),
                    int(crawl.retry_at_ms),
                    to_json(&crawl.config)?,
                    int(crawl.created_at_ms),
                    int(crawl.modified_at_ms),
                ],
            )
        })?;
        Ok(())
    }

    pub fn get_crawl(&self, id: &str) -> Result<Option<Crawl>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM crawls WHERE id = ?1");
        self.with_conn(|c| c.query_row(&sql, params![id], from_row).optional())
    }

    pub fn require_crawl(&self, id: &str) -> Result<Crawl, StoreError> {
        self.get_crawl(id)?.ok_or_else(|| StoreError::NotFound { kind: "crawl", id: id.to_string() })
    }

    /// Persist a status change made by the crawl's owning worker.
    pub fn set_crawl_status(&self, id: &str, status: JobStatus, now_ms: u64) -> Result<(), StoreError> {
        let changed = self.with_conn(|c| {
            c.execute(
                "UPDATE crawls SET status = ?2, modified_at_ms = ?3 WHERE id = ?1",
                params![id, status.as_str(), int(now_ms)],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "crawl", id: id.to_string() });
        }
        Ok(())
    }

    /// Crawls claimable at `now_ms`, oldest schedule first.
    pub fn crawls_ready(&self, now_ms: u64, scope: Option<&str>, limit: usize) -> Result<Vec<Crawl>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM crawls
             WHERE status NOT IN ('sealed', 'failed') AND retry_at_ms <= ?1 AND (?2 IS NULL OR id = ?2)
             ORDER BY retry_at_ms, created_at_ms LIMIT ?3"
        );
        self.with_conn(|c| {
            let mut stmt = c.prepare(&sql)?;
            let rows = stmt.query_map(params![int(now_ms), scope, limit as i64], from_row)?;
            rows.collect()
        })
    }

    pub fn list_crawls(&self, limit: usize) -> Result<Vec<Crawl>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM crawls ORDER BY created_at_ms DESC LIMIT ?1");
        self.with_conn(|c| {
            let mut stmt = c.prepare(&sql)?;
            let rows = stmt.query_map(params![limit as i64], from_row)?;
            rows.collect()
        })
    }
}

#[cfg(test)]
#[path = "crawls_tests.rs"]
mod tests;
