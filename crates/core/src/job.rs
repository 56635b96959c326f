// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job kinds and their state machines.
//!
//! Crawl and Snapshot share the [`JobStatus`] machine:
//!
//! ```text
//! queued --claim--> started --run--> sealed | failed | backoff
//! backoff --retry_at elapses--> queued
//! ```
//!
//! Binaries only move `queued -> installed`. Archive results move
//! `queued -> started -> succeeded | failed | skipped` and may be reset to
//! `queued` for a retry.
//!
//! Transitions return `Result<_, TransitionNotAllowed>`; callers treat the
//! error as retryable and leave the job where it is.

use crate::config::ConfigMap;
use crate::id::{BinaryId, CrawlId, MachineId, ProcessId, ResultId, SnapshotId};
use std::time::Duration;
use thiserror::Error;

crate::text_enum! {
    pub enum JobStatus {
        Queued => "queued",
        Started => "started",
        Sealed => "sealed",
        Failed => "failed",
        Backoff => "backoff",
    }
}

crate::text_enum! {
    pub enum BinaryStatus {
        Queued => "queued",
        Installed => "installed",
    }
}

crate::text_enum! {
    /// Outcome of one hook against one snapshot.
    pub enum ResultStatus {
        Queued => "queued",
        Started => "started",
        Succeeded => "succeeded",
        Failed => "failed",
        Skipped => "skipped",
    }
}

crate::text_enum! {
    pub enum JobKind {
        Crawl => "crawl",
        Snapshot => "snapshot",
        Binary => "binary",
        ArchiveResult => "archive_result",
    }
}

/// Claim lockout for crawls and snapshots.
pub const JOB_LOCKOUT: Duration = Duration::from_secs(24 * 60 * 60);
/// Claim lockout for binary installs.
pub const BINARY_LOCKOUT: Duration = Duration::from_secs(600);
/// Delay before a binary whose install hooks all failed is retried.
pub const BINARY_RETRY_DELAY: Duration = Duration::from_secs(300);
/// Delay applied when a claimed job cannot start yet.
pub const BACKOFF_DELAY: Duration = Duration::from_secs(60);

/// A guard rejected a state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} {id}: cannot move {from} -> {to}{}", reason_suffix(.reason))]
pub struct TransitionNotAllowed {
    pub kind: JobKind,
    pub id: String,
    pub from: &'static str,
    pub to: &'static str,
    pub reason: Option<String>,
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(" ({r})"),
        None => String::new(),
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Sealed | JobStatus::Failed)
    }

    /// States the claim protocol may pick up once `retry_at` has elapsed.
    /// A `started` job whose lock elapsed was orphaned by its worker.
    pub fn is_claimable(self) -> bool {
        !self.is_terminal()
    }

    pub fn allows(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Queued, Started)
                | (Queued, Failed)
                | (Started, Sealed)
                | (Started, Failed)
                | (Started, Backoff)
                | (Backoff, Queued)
                | (Backoff, Started)
                | (Backoff, Failed)
        )
    }
}

impl ResultStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ResultStatus::Succeeded | ResultStatus::Failed | ResultStatus::Skipped)
    }

    pub fn allows(self, to: ResultStatus) -> bool {
        use ResultStatus::*;
        match (self, to) {
            (Queued, Started) => true,
            (Started, Succeeded | Failed | Skipped) => true,
            (Queued, Skipped) => true,
            // Retry reset.
            (from, Queued) => from != Queued,
            _ => false,
        }
    }

    /// Status keyword emitted by hooks; anything unrecognised counts as failed.
    pub fn from_hook(status: &str) -> ResultStatus {
        match status.trim().to_ascii_lowercase().as_str() {
            "succeeded" => ResultStatus::Succeeded,
            "skipped" => ResultStatus::Skipped,
            _ => ResultStatus::Failed,
        }
    }
}

/// Shared state-machine behaviour of Crawl and Snapshot.
pub trait Job {
    const KIND: JobKind;

    fn job_id(&self) -> &str;
    fn status(&self) -> JobStatus;
    fn set_status(&mut self, status: JobStatus);
    fn retry_at_ms(&self) -> u64;

    /// Guard for `-> started`.
    fn can_start(&self) -> Result<(), String> {
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Apply a transition, returning the previous status.
    fn try_transition(&mut self, to: JobStatus) -> Result<JobStatus, TransitionNotAllowed> {
        let from = self.status();
        let reject = |reason: Option<String>| TransitionNotAllowed {
            kind: Self::KIND,
            id: self.job_id().to_string(),
            from: from.as_str(),
            to: to.as_str(),
            reason,
        };
        if !from.allows(to) {
            return Err(reject(None));
        }
        if to == JobStatus::Started {
            self.can_start().map_err(|r| reject(Some(r)))?;
        }
        self.set_status(to);
        Ok(from)
    }
}

/// Top-level job: a set of seed URLs and a recursion depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Crawl {
    pub id: CrawlId,
    /// Newline-separated seed URLs.
    pub urls: String,
    pub max_depth: u32,
    pub status: JobStatus,
    pub retry_at_ms: u64,
    pub config: ConfigMap,
    pub created_at_ms: u64,
    pub modified_at_ms: u64,
}

impl Crawl {
    pub fn new(urls: impl Into<String>, max_depth: u32, now_ms: u64) -> Self {
        Self {
            id: CrawlId::new(),
            urls: urls.into(),
            max_depth,
            status: JobStatus::Queued,
            retry_at_ms: now_ms,
            config: ConfigMap::new(),
            created_at_ms: now_ms,
            modified_at_ms: now_ms,
        }
    }

    /// Non-empty, trimmed URL lines. `#` starts a comment line.
    pub fn url_list(&self) -> Vec<&str> {
        self.urls
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect()
    }
}

impl Job for Crawl {
    const KIND: JobKind = JobKind::Crawl;

    fn job_id(&self) -> &str {
        &self.id
    }
    fn status(&self) -> JobStatus {
        self.status
    }
    fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }
    fn retry_at_ms(&self) -> u64 {
        self.retry_at_ms
    }

    fn can_start(&self) -> Result<(), String> {
        if self.url_list().is_empty() {
            return Err("crawl has no urls".to_string());
        }
        Ok(())
    }
}

/// One URL's archiving job, child of a Crawl.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub crawl_id: CrawlId,
    pub url: String,
    pub depth: u32,
    pub status: JobStatus,
    pub retry_at_ms: u64,
    pub config: ConfigMap,
    pub created_at_ms: u64,
    pub modified_at_ms: u64,
}

impl Snapshot {
    pub fn new(crawl_id: CrawlId, url: impl Into<String>, depth: u32, now_ms: u64) -> Self {
        Self {
            id: SnapshotId::new(),
            crawl_id,
            url: url.into(),
            depth,
            status: JobStatus::Queued,
            retry_at_ms: now_ms,
            config: ConfigMap::new(),
            created_at_ms: now_ms,
            modified_at_ms: now_ms,
        }
    }
}

impl Job for Snapshot {
    const KIND: JobKind = JobKind::Snapshot;

    fn job_id(&self) -> &str {
        &self.id
    }
    fn status(&self) -> JobStatus {
        self.status
    }
    fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }
    fn retry_at_ms(&self) -> u64 {
        self.retry_at_ms
    }

    fn can_start(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("snapshot has no url".to_string());
        }
        Ok(())
    }
}

/// An installable runtime dependency, unique per machine and name.
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub id: BinaryId,
    pub machine_id: MachineId,
    pub name: String,
    /// Comma-separated provider names to try, empty for any.
    pub binproviders: String,
    pub overrides: serde_json::Value,
    pub status: BinaryStatus,
    pub retry_at_ms: u64,
    pub abspath: Option<String>,
    pub version: Option<String>,
    pub sha256: Option<String>,
    pub binprovider: Option<String>,
    pub created_at_ms: u64,
    pub modified_at_ms: u64,
}

/// Details reported by a successful install hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledBinary {
    pub abspath: String,
    pub version: Option<String>,
    pub sha256: Option<String>,
    pub binprovider: Option<String>,
}

impl Binary {
    pub fn new(machine_id: MachineId, name: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: BinaryId::new(),
            machine_id,
            name: name.into(),
            binproviders: String::new(),
            overrides: serde_json::Value::Null,
            status: BinaryStatus::Queued,
            retry_at_ms: now_ms,
            abspath: None,
            version: None,
            sha256: None,
            binprovider: None,
            created_at_ms: now_ms,
            modified_at_ms: now_ms,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.status == BinaryStatus::Installed
    }
}

/// Persisted outcome of running one hook against one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveResult {
    pub id: ResultId,
    pub snapshot_id: SnapshotId,
    pub plugin: String,
    pub hook_name: String,
    pub status: ResultStatus,
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
    pub output_str: String,
    pub output_size: u64,
    pub process_id: Option<ProcessId>,
    pub created_at_ms: u64,
    pub modified_at_ms: u64,
}

impl ArchiveResult {
    pub fn new(snapshot_id: SnapshotId, plugin: impl Into<String>, hook_name: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: ResultId::new(),
            snapshot_id,
            plugin: plugin.into(),
            hook_name: hook_name.into(),
            status: ResultStatus::Queued,
            start_ms: None,
            end_ms: None,
            output_str: String::new(),
            output_size: 0,
            process_id: None,
            created_at_ms: now_ms,
            modified_at_ms: now_ms,
        }
    }

    pub fn try_transition(&mut self, to: ResultStatus, now_ms: u64) -> Result<ResultStatus, TransitionNotAllowed> {
        let from = self.status;
        if !from.allows(to) {
            return Err(TransitionNotAllowed {
                kind: JobKind::ArchiveResult,
                id: self.id.to_string(),
                from: from.as_str(),
                to: to.as_str(),
                reason: None,
            });
        }
        match to {
            ResultStatus::Queued => {
                self.start_ms = None;
                self.end_ms = None;
                self.output_str.clear();
                self.output_size = 0;
                self.process_id = None;
            }
            ResultStatus::Started => self.start_ms = Some(now_ms),
            _ => self.end_ms = Some(now_ms),
        }
        self.status = to;
        self.modified_at_ms = now_ms;
        Ok(from)
    }
}

crate::builder! {
    pub struct CrawlBuilder => Crawl {
        into {
            id: CrawlId = CrawlId::new(),
            urls: String = "https://example.com",
        }
        set {
            max_depth: u32 = 0,
            status: JobStatus = JobStatus::Queued,
            retry_at_ms: u64 = 0,
            config: ConfigMap = ConfigMap::new(),
            created_at_ms: u64 = 0,
            modified_at_ms: u64 = 0,
        }
    }
}

crate::builder! {
    pub struct SnapshotBuilder => Snapshot {
        into {
            id: SnapshotId = SnapshotId::new(),
            crawl_id: CrawlId = "crw-test",
            url: String = "https://example.com",
        }
        set {
            depth: u32 = 0,
            status: JobStatus = JobStatus::Queued,
            retry_at_ms: u64 = 0,
            config: ConfigMap = ConfigMap::new(),
            created_at_ms: u64 = 0,
            modified_at_ms: u64 = 0,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
