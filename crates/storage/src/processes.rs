// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process records and process-tree queries.

use crate::rows::{get_enum, get_json, get_opt_u64, get_u64, int, opt_int, to_json};
use crate::store::{Store, StoreError};
use keep_core::{ProcessId, ProcessKind, ProcessRecord, ProcessStatus, WorkerKind};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

const COLUMNS: &str = "id, machine_id, parent_id, kind, worker_kind, cmd, pwd, env, timeout_secs, status, pid, \
                       exit_code, stdout, stderr, started_at_ms, ended_at_ms, created_at_ms, modified_at_ms";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ProcessRecord> {
    let worker_kind: Option<String> = row.get(4)?;
    Ok(ProcessRecord {
        id: ProcessId::from_string(row.get::<_, String>(0)?),
        machine_id: row.get::<_, String>(1)?.into(),
        parent_id: row.get::<_, Option<String>>(2)?.map(ProcessId::from_string),
        kind: get_enum(row, 3, ProcessKind::parse)?,
        worker_kind: worker_kind.as_deref().and_then(WorkerKind::parse),
        cmd: get_json(row, 5)?,
        pwd: PathBuf::from(row.get::<_, String>(6)?),
        env: get_json(row, 7)?,
        timeout: Duration::from_secs(get_u64(row, 8)?),
        status: get_enum(row, 9, ProcessStatus::parse)?,
        pid: row.get::<_, Option<i64>>(10)?.map(|p| p as u32),
        exit_code: row.get(11)?,
        stdout: row.get(12)?,
        stderr: row.get(13)?,
        started_at_ms: get_opt_u64(row, 14)?,
        ended_at_ms: get_opt_u64(row, 15)?,
        created_at_ms: get_u64(row, 16)?,
        modified_at_ms: get_u64(row, 17)?,
    })
}

impl Store {
    pub fn insert_process(&self, p: &ProcessRecord) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO processes ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        );
        self.with_conn(|c| {
            c.execute(
                &sql,
                params![
                    p.id.as_str(),
                    p.machine_id.as_str(),
                    p.parent_id.as_ref().map(|id| id.as_str()),
                    p.kind.as_str(),
                    p.worker_kind.map(|k| k.as_str()),
                    to_json(&p.cmd)?,
                    p.pwd.to_string_lossy(),
                    to_json(&p.env)?,
                    int(p.timeout.as_secs()),
                    p.status.as_str(),
                    p.pid.map(i64::from),
                    p.exit_code,
                    p.stdout,
                    p.stderr,
                    opt_int(p.started_at_ms),
                    opt_int(p.ended_at_ms),
                    int(p.created_at_ms),
                    int(p.modified_at_ms),
                ],
            )
        })?;
        Ok(())
    }

    /// Write back every mutable column of an existing record.
    pub fn update_process(&self, p: &ProcessRecord) -> Result<(), StoreError> {
        let changed = self.with_conn(|c| {
            c.execute(
                "UPDATE processes SET parent_id = ?2, worker_kind = ?3, cmd = ?4, pwd = ?5, env = ?6,
                   timeout_secs = ?7, status = ?8, pid = ?9, exit_code = ?10, stdout = ?11, stderr = ?12,
                   started_at_ms = ?13, ended_at_ms = ?14, modified_at_ms = ?15
                 WHERE id = ?1",
                params![
                    p.id.as_str(),
                    p.parent_id.as_ref().map(|id| id.as_str()),
                    p.worker_kind.map(|k| k.as_str()),
                    to_json(&p.cmd)?,
                    p.pwd.to_string_lossy(),
                    to_json(&p.env)?,
                    int(p.timeout.as_secs()),
                    p.status.as_str(),
                    p.pid.map(i64::from),
                    p.exit_code,
                    p.stdout,
                    p.stderr,
                    opt_int(p.started_at_ms),
                    opt_int(p.ended_at_ms),
                    int(p.modified_at_ms),
                ],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "process", id: p.id.to_string() });
        }
        Ok(())
    }

    pub fn get_process(&self, id: &str) -> Result<Option<ProcessRecord>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM processes WHERE id = ?1");
        self.with_conn(|c| c.query_row(&sql, params![id], from_row).optional())
    }

    /// Running records, optionally filtered by kind and worker kind.
    pub fn get_running(
        &self,
        kind: Option<ProcessKind>,
        worker_kind: Option<WorkerKind>,
    ) -> Result<Vec<ProcessRecord>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM processes
             WHERE status = 'running' AND (?1 IS NULL OR kind = ?1) AND (?2 IS NULL OR worker_kind = ?2)
             ORDER BY created_at_ms, id"
        );
        self.with_conn(|c| {
            let mut stmt = c.prepare(&sql)?;
            let rows = stmt.query_map(params![kind.map(|k| k.as_str()), worker_kind.map(|k| k.as_str())], from_row)?;
            rows.collect()
        })
    }

    pub fn children(&self, id: &str) -> Result<Vec<ProcessRecord>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM processes WHERE parent_id = ?1 ORDER BY created_at_ms, id");
        self.with_conn(|c| {
            let mut stmt = c.prepare(&sql)?;
            let rows = stmt.query_map(params![id], from_row)?;
            rows.collect()
        })
    }

    /// The subtree under `id`, breadth-first, by walking parent links.
    pub fn get_descendants(&self, id: &str, include_self: bool) -> Result<Vec<ProcessRecord>, StoreError> {
        let mut out = Vec::new();
        if include_self {
            if let Some(me) = self.get_process(id)? {
                out.push(me);
            }
        }
        let mut seen: HashSet<String> = HashSet::from([id.to_string()]);
        let mut frontier = VecDeque::from([id.to_string()]);
        while let Some(next) = frontier.pop_front() {
            for child in self.children(&next)? {
                if seen.insert(child.id.to_string()) {
                    frontier.push_back(child.id.to_string());
                    out.push(child);
                }
            }
        }
        Ok(out)
    }

    /// Parents of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> Result<Vec<ProcessRecord>, StoreError> {
        let mut out = Vec::new();
        let mut seen: HashSet<String> = HashSet::from([id.to_string()]);
        let mut cursor = self.get_process(id)?.and_then(|p| p.parent_id);
        while let Some(parent_id) = cursor {
            if !seen.insert(parent_id.to_string()) {
                break;
            }
            match self.get_process(&parent_id)? {
                Some(parent) => {
                    cursor = parent.parent_id.clone();
                    out.push(parent);
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Topmost ancestor of `id`, or the record itself if it has no parent.
    pub fn root(&self, id: &str) -> Result<Option<ProcessRecord>, StoreError> {
        match self.ancestors(id)?.pop() {
            Some(root) => Ok(Some(root)),
            None => self.get_process(id),
        }
    }

    pub fn depth(&self, id: &str) -> Result<usize, StoreError> {
        Ok(self.ancestors(id)?.len())
    }
}

#[cfg(test)]
#[path = "processes_tests.rs"]
mod tests;
