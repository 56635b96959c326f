// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured output of a finished hook.

use keep_core::record::{ArchiveResultRecord, BinaryRecord, ProcessPatch, SnapshotRecord};
use keep_core::{HookRecord, ProcessRecord, ResultStatus};
use std::path::Path;
use walkdir::WalkDir;

/// Files the supervisor writes into every process directory.
const BOOKKEEPING_FILES: &[&str] = &["stdout.log", "stderr.log", "cmd.sh"];

/// Records a hook emitted, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookOutput {
    /// Last `ArchiveResult` record, if any.
    pub result: Option<ArchiveResultRecord>,
    pub snapshots: Vec<SnapshotRecord>,
    pub binaries: Vec<BinaryRecord>,
    pub process: Option<ProcessPatch>,
}

impl HookOutput {
    pub fn parse(stdout: &str) -> Self {
        let mut out = HookOutput::default();
        for decoded in HookRecord::parse_output(stdout) {
            match decoded {
                Ok(HookRecord::ArchiveResult(r)) => out.result = Some(r),
                Ok(HookRecord::Snapshot(s)) => out.snapshots.push(s),
                Ok(HookRecord::Binary(b)) => out.binaries.push(b),
                Ok(HookRecord::Process(p)) => out.process = Some(p),
                Ok(HookRecord::Unknown { kind }) => {
                    tracing::debug!(kind, "ignoring unknown hook record");
                }
                Err(e) => tracing::warn!(error = %e, "malformed hook record"),
            }
        }
        out
    }

    /// Parse the hook's complete stdout log. The record only carries a
    /// tail, so it is used only when the log is unreadable.
    pub fn read(record: &ProcessRecord) -> Self {
        match std::fs::read_to_string(record.stdout_path()) {
            Ok(stdout) => Self::parse(&stdout),
            Err(_) => Self::parse(&record.stdout),
        }
    }

    pub fn output_str(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.output_str.as_deref())
    }
}

/// Final status of the result a hook ran for.
///
/// A reported status wins over the exit code. Without one, foreground hooks
/// succeed on exit 0 and background hooks count as skipped.
pub fn result_status(output: &HookOutput, exit_code: Option<i32>, background: bool) -> ResultStatus {
    if let Some(status) = output.result.as_ref().and_then(|r| r.status.as_deref()) {
        return ResultStatus::from_hook(status);
    }
    match (background, exit_code) {
        (true, _) => ResultStatus::Skipped,
        (false, Some(0)) => ResultStatus::Succeeded,
        (false, _) => ResultStatus::Failed,
    }
}

/// Bytes a hook produced in `dir`, excluding supervisor bookkeeping.
pub fn output_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && !is_bookkeeping(e.path()))
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn is_bookkeeping(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    BOOKKEEPING_FILES.contains(&name) || name.ends_with(".pid")
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
