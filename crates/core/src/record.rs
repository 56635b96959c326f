// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured records emitted by hooks on stdout.
//!
//! Each line that parses as a JSON object with a `type` field is one record.
//! Known types decode into their own variant; anything else is kept as
//! [`HookRecord::Unknown`] so callers can log it. Lines that are not JSON
//! objects are plain log output and are skipped.

use crate::config::ConfigMap;
use crate::job::InstalledBinary;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("malformed {kind} record: {source}")]
pub struct RecordError {
    pub kind: String,
    #[source]
    pub source: serde_json::Error,
}

/// Result of the hook that emitted it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArchiveResultRecord {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "output")]
    pub output_str: Option<String>,
}

/// A URL discovered by a crawl hook.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SnapshotRecord {
    pub url: String,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub config: Option<ConfigMap>,
}

/// A dependency to install, or one an install hook has just installed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinaryRecord {
    pub name: String,
    #[serde(default)]
    pub abspath: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub binprovider: Option<String>,
    #[serde(default)]
    pub binproviders: Option<String>,
    #[serde(default)]
    pub overrides: Option<Value>,
}

impl BinaryRecord {
    /// Install details, present once the record carries an `abspath`.
    pub fn installed(&self) -> Option<InstalledBinary> {
        let abspath = self.abspath.as_ref().filter(|p| !p.trim().is_empty())?;
        Some(InstalledBinary {
            abspath: abspath.clone(),
            version: self.version.clone(),
            sha256: self.sha256.clone(),
            binprovider: self.binprovider.clone(),
        })
    }
}

/// Patch for the emitting hook's own process record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProcessPatch {
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookRecord {
    ArchiveResult(ArchiveResultRecord),
    Snapshot(SnapshotRecord),
    Binary(BinaryRecord),
    Process(ProcessPatch),
    Unknown { kind: String },
}

impl HookRecord {
    /// Decode one stdout line. `None` for lines that are not JSON objects
    /// with a `type` field.
    pub fn decode_line(line: &str) -> Option<Result<HookRecord, RecordError>> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        let value: Value = serde_json::from_str(line).ok()?;
        let kind = value.get("type")?.as_str()?.to_string();
        Some(Self::decode(kind, value))
    }

    fn decode(kind: String, value: Value) -> Result<HookRecord, RecordError> {
        fn parse<T: for<'de> Deserialize<'de>>(kind: &str, value: Value) -> Result<T, RecordError> {
            serde_json::from_value(value).map_err(|source| RecordError { kind: kind.to_string(), source })
        }
        Ok(match kind.as_str() {
            "ArchiveResult" => HookRecord::ArchiveResult(parse(&kind, value)?),
            "Snapshot" => HookRecord::Snapshot(parse(&kind, value)?),
            "Binary" => HookRecord::Binary(parse(&kind, value)?),
            "Process" => HookRecord::Process(parse(&kind, value)?),
            _ => HookRecord::Unknown { kind },
        })
    }

    /// Decode every record in a hook's stdout, in emission order.
    pub fn parse_output(stdout: &str) -> Vec<Result<HookRecord, RecordError>> {
        stdout.lines().filter_map(Self::decode_line).collect()
    }

    pub fn kind(&self) -> &str {
        match self {
            HookRecord::ArchiveResult(_) => "ArchiveResult",
            HookRecord::Snapshot(_) => "Snapshot",
            HookRecord::Binary(_) => "Binary",
            HookRecord::Process(_) => "Process",
            HookRecord::Unknown { kind } => kind,
        }
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
