// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job state machines: claiming, transitions and kind-specific work.
//!
//! Everything here runs inside the worker process that owns the job. The
//! only cross-process coordination is [`claim`], a compare-and-swap on the
//! job's `retry_at`.

pub mod binary;
pub mod crawl;
pub mod snapshot;

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::hooks::HookOutput;
use keep_adapters::ProcessAdapter;
use keep_core::job::{BINARY_LOCKOUT, JOB_LOCKOUT};
use keep_core::{Binary, Clock, Crawl, Job, JobKind, JobStatus, ProcessKind, ProcessRecord, Snapshot};
use keep_storage::{Store, StoreError};
use std::path::Path;
use std::time::Duration;
use walkdir::WalkDir;

/// A job whose status lives in its own table.
pub trait PersistedJob: Job {
    fn save_status(&self, store: &Store, now_ms: u64) -> Result<(), StoreError>;
}

impl PersistedJob for Crawl {
    fn save_status(&self, store: &Store, now_ms: u64) -> Result<(), StoreError> {
        store.set_crawl_status(&self.id, self.status, now_ms)
    }
}

impl PersistedJob for Snapshot {
    fn save_status(&self, store: &Store, now_ms: u64) -> Result<(), StoreError> {
        store.set_snapshot_status(&self.id, self.status, now_ms)
    }
}

/// Claim a due, unfinished job by swapping its `retry_at` for a lockout.
///
/// Only one of any number of concurrent callers that read the same
/// `retry_at` wins.
pub fn claim<J: Job>(store: &Store, job: &J, now_ms: u64) -> Result<bool, EngineError> {
    if !job.status().is_claimable() || job.retry_at_ms() > now_ms {
        return Ok(false);
    }
    let lockout = now_ms.saturating_add(JOB_LOCKOUT.as_millis() as u64);
    Ok(store.claim(J::KIND, job.job_id(), job.retry_at_ms(), lockout, now_ms)?)
}

/// Claim a queued binary for one install attempt.
pub fn claim_binary(store: &Store, binary: &Binary, now_ms: u64) -> Result<bool, EngineError> {
    if binary.is_installed() || binary.retry_at_ms > now_ms {
        return Ok(false);
    }
    let lockout = now_ms.saturating_add(BINARY_LOCKOUT.as_millis() as u64);
    Ok(store.claim(JobKind::Binary, &binary.id, binary.retry_at_ms, lockout, now_ms)?)
}

/// Apply and persist a transition.
///
/// A rejected transition is logged and reported as `false`; the job is left
/// where it is for the next tick to re-evaluate.
pub fn transition<J: PersistedJob>(store: &Store, job: &mut J, to: JobStatus, now_ms: u64) -> Result<bool, EngineError> {
    match job.try_transition(to) {
        Ok(from) => {
            job.save_status(store, now_ms)?;
            tracing::debug!(kind = %J::KIND, id = job.job_id(), %from, %to, "job transition");
            Ok(true)
        }
        Err(rejected) => {
            tracing::warn!(error = %rejected, "transition rejected");
            Ok(false)
        }
    }
}

/// Move a claimed job to `started`.
///
/// Returns `false` when there is nothing to do: the job is finished, or its
/// start guard failed, in which case it is rescheduled after `delay`.
pub fn start<J: PersistedJob>(store: &Store, job: &mut J, delay: Duration, now_ms: u64) -> Result<bool, EngineError> {
    match job.status() {
        JobStatus::Started => Ok(true),
        status if status.is_terminal() => Ok(false),
        _ => {
            if transition(store, job, JobStatus::Started, now_ms)? {
                return Ok(true);
            }
            store.set_retry_at(J::KIND, job.job_id(), now_ms.saturating_add(delay.as_millis() as u64), now_ms)?;
            Ok(false)
        }
    }
}

/// Put a started job back in the queue at `retry_at_ms`.
pub fn backoff<J: PersistedJob>(store: &Store, job: &mut J, retry_at_ms: u64, now_ms: u64) -> Result<(), EngineError> {
    if job.status() == JobStatus::Started {
        transition(store, job, JobStatus::Backoff, now_ms)?;
    }
    store.set_retry_at(J::KIND, job.job_id(), retry_at_ms, now_ms)?;
    Ok(())
}

/// Seal status for a parent whose children are all finished: failed when
/// something failed and nothing succeeded.
pub fn seal_status(failed: usize, succeeded: usize) -> JobStatus {
    if failed > 0 && succeeded == 0 {
        JobStatus::Failed
    } else {
        JobStatus::Sealed
    }
}

/// Apply records a hook emitted for `crawl`.
///
/// Snapshot records default to `default_depth` and are dropped past the
/// crawl's `max_depth`; an existing snapshot has the record's config merged
/// in. Binary records with an `abspath` are stored installed, others are
/// queued. A process patch rewrites the hook's own command line.
pub fn apply_hook_output<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    crawl: &Crawl,
    default_depth: u32,
    hook: &mut ProcessRecord,
    output: &HookOutput,
) -> Result<(), EngineError> {
    let now = ctx.now();
    for record in &output.snapshots {
        let depth = record.depth.unwrap_or(default_depth);
        if depth > crawl.max_depth {
            tracing::debug!(url = %record.url, depth, max_depth = crawl.max_depth, "dropping snapshot beyond max depth");
            continue;
        }
        let mut fresh = Snapshot::new(crawl.id.clone(), record.url.clone(), depth, now);
        if let Some(config) = &record.config {
            fresh.config = config.clone();
        }
        let (mut stored, created) = ctx.store.get_or_create_snapshot(&fresh)?;
        if created {
            tracing::info!(snapshot = %stored.id, url = %stored.url, depth, "discovered snapshot");
        } else if let Some(config) = record.config.as_ref().filter(|c| !c.is_empty()) {
            stored.config.merge(config);
            ctx.store.set_snapshot_config(&stored.id, &stored.config, now)?;
        }
    }

    for record in &output.binaries {
        let mut binary = Binary::new(ctx.machine.clone(), record.name.clone(), now);
        if let Some(providers) = &record.binproviders {
            binary.binproviders = providers.clone();
        }
        if let Some(overrides) = &record.overrides {
            binary.overrides = overrides.clone();
        }
        let (stored, created) = ctx.store.get_or_queue_binary(&binary)?;
        match record.installed() {
            Some(installed) if !stored.is_installed() => {
                ctx.store.mark_binary_installed(&stored.id, &installed, now)?;
                tracing::info!(binary = %stored.name, abspath = %installed.abspath, "binary reported installed");
            }
            _ if created => tracing::info!(binary = %stored.name, "queued binary"),
            _ => {}
        }
    }

    if let Some(cmd) = output.process.as_ref().and_then(|p| p.cmd.clone()) {
        hook.cmd = cmd;
        ctx.store.update_process(hook)?;
    }
    Ok(())
}

/// Tree-kill hook processes still running with a working directory under
/// `dir`. Returns how many processes were signalled.
pub async fn kill_hooks_under<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    dir: &Path,
    grace: Duration,
) -> Result<usize, EngineError> {
    let mut hooks: Vec<ProcessRecord> = ctx
        .store
        .get_running(Some(ProcessKind::Hook), None)?
        .into_iter()
        .filter(|p| p.machine_id == ctx.machine && p.pwd.starts_with(dir))
        .collect();
    if hooks.is_empty() {
        return Ok(0);
    }
    tracing::info!(count = hooks.len(), dir = %dir.display(), "killing leftover hooks");
    ctx.supervisor().kill_trees(&mut hooks, |_| grace).await
}

/// Delete stray `*.pid` files below `dir`.
pub fn remove_pid_files(dir: &Path) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        let is_pid = entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "pid");
        if is_pid && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
