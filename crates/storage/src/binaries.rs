// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::rows::{get_enum, get_json, get_u64, int, to_json};
use crate::store::{Store, StoreError};
use keep_core::{Binary, BinaryId, BinaryStatus, InstalledBinary, MachineId};
use rusqlite::{params, OptionalExtension, Row};

const COLUMNS: &str = "id, machine_id, name, binproviders, overrides, status, retry_at_ms, abspath, version, sha256, \
                       binprovider, created_at_ms, modified_at_ms";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Binary> {
    Ok(Binary {
        id: BinaryId::from_string(row.get::<_, String>(0)?),
        machine_id: MachineId::from_string(row.get::<_, String>(1)?),
        name: row.get(2)?,
        binproviders: row.get(3)?,
        overrides: get_json(row, 4)?,
        status: get_enum(row, 5, BinaryStatus::parse)?,
        retry_at_ms: get_u64(row, 6)?,
        abspath: row.get(7)?,
        version: row.get(8)?,
        sha256: row.get(9)?,
        binprovider: row.get(10)?,
        created_at_ms: get_u64(row, 11)?,
        modified_at_ms: get_u64(row, 12)?,
    })
}

impl Store {
    /// Queue a binary for install unless this machine already has a row for
    /// that name. Returns the stored row and whether it was newly created.
    pub fn get_or_queue_binary(&self, binary: &Binary) -> Result<(Binary, bool), StoreError> {
        let sql = format!(
            "INSERT OR IGNORE INTO binaries ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        );
        let created = self.with_conn(|c| {
            c.execute(
                &sql,
                params![
                    binary.id.as_str(),
                    binary.machine_id.as_str(),
                    binary.name,
                    binary.binproviders,
                    to_json(&binary.overrides)?,
                    binary.status.as_str(),
                    int(binary.retry_at_ms),
                    binary.abspath,
                    binary.version,
                    binary.sha256,
                    binary.binprovider,
                    int(binary.created_at_ms),
                    int(binary.modified_at_ms),
                ],
            )
        })? == 1;
        let stored = self
            .binary_by_name(&binary.machine_id, &binary.name)?
            .ok_or_else(|| StoreError::NotFound { kind: "binary", id: binary.name.clone() })?;
        Ok((stored, created))
    }

    pub fn get_binary(&self, id: &str) -> Result<Option<Binary>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM binaries WHERE id = ?1");
        self.with_conn(|c| c.query_row(&sql, params![id], from_row).optional())
    }

    pub fn require_binary(&self, id: &str) -> Result<Binary, StoreError> {
        self.get_binary(id)?.ok_or_else(|| StoreError::NotFound { kind: "binary", id: id.to_string() })
    }

    pub fn binary_by_name(&self, machine: &MachineId, name: &str) -> Result<Option<Binary>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM binaries WHERE machine_id = ?1 AND name = ?2");
        self.with_conn(|c| c.query_row(&sql, params![machine.as_str(), name], from_row).optional())
    }

    /// Queued binaries on `machine` whose `retry_at` has elapsed.
    pub fn binaries_ready(&self, machine: &MachineId, now_ms: u64) -> Result<Vec<Binary>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM binaries
             WHERE machine_id = ?1 AND status = 'queued' AND retry_at_ms <= ?2
             ORDER BY retry_at_ms, created_at_ms"
        );
        self.with_conn(|c| {
            let mut stmt = c.prepare(&sql)?;
            let rows = stmt.query_map(params![machine.as_str(), int(now_ms)], from_row)?;
            rows.collect()
        })
    }

    pub fn mark_binary_installed(&self, id: &str, installed: &InstalledBinary, now_ms: u64) -> Result<(), StoreError> {
        let changed = self.with_conn(|c| {
            c.execute(
                "UPDATE binaries SET status = 'installed', abspath = ?2, version = ?3, sha256 = ?4,
                   binprovider = ?5, modified_at_ms = ?6
                 WHERE id = ?1",
                params![
                    id,
                    installed.abspath,
                    installed.version,
                    installed.sha256,
                    installed.binprovider,
                    int(now_ms)
                ],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "binary", id: id.to_string() });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "binaries_tests.rs"]
mod tests;
