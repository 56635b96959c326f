// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker processes: one claimed job per OS process.
//!
//! A worker started by a parent (orchestrator or crawl worker) finds the
//! record its parent created through `KEEP_PROCESS_ID` and trusts the
//! parent's claim. A worker started by hand registers its own record and
//! claims the job itself.

mod background;
mod binary;
mod crawl;
mod snapshot;

pub use background::BackgroundHooks;

use crate::context::{EngineContext, WorkerTarget};
use crate::error::EngineError;
use crate::machine::{backoff, transition, PersistedJob};
use crate::supervisor::TERMINATE_GRACE;
use keep_adapters::ProcessAdapter;
use keep_core::process::WORKER_TIMEOUT;
use keep_core::{Clock, JobStatus, ProcessId, ProcessKind, ProcessRecord};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Env var carrying the id of the record a parent created for its child.
pub const PROCESS_ID_ENV: &str = "KEEP_PROCESS_ID";

/// Launch a worker subprocess for `target` under `parent`.
pub async fn spawn_worker<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    target: &WorkerTarget,
    parent: Option<&ProcessId>,
) -> Result<ProcessRecord, EngineError> {
    let cmd = target.command(&ctx.paths.keep_bin);
    let mut record = ProcessRecord::new(ProcessKind::Worker, cmd, "", ctx.machine.clone(), ctx.now())
        .with_parent(parent.cloned())
        .with_worker_kind(target.worker_kind())
        .with_timeout(WORKER_TIMEOUT);
    record.pwd = ctx.paths.worker_dir(&record.id);

    let mut env: BTreeMap<String, String> = ctx.base_env().into_iter().collect();
    env.insert(PROCESS_ID_ENV.to_string(), record.id.to_string());
    record.env = env;

    let pid = ctx.supervisor().launch(&mut record, true).await?;
    tracing::info!(process = %record.id, pid, worker = %target.worker_kind(), args = ?target.args(), "spawned worker");
    Ok(record)
}

/// Record for the current process: the one the parent created, or a new
/// standalone one.
pub fn register_self<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    target: &WorkerTarget,
) -> Result<ProcessRecord, EngineError> {
    let pid = std::process::id();
    let started = ctx.adapter.start_time_ms(pid).unwrap_or_else(|| ctx.now());

    if let Some(id) = &ctx.inherited_process {
        if let Some(mut record) = ctx.store.get_process(id)? {
            if !record.is_running() || record.pid != Some(pid) {
                record.mark_running(pid, started);
                ctx.store.update_process(&record)?;
            }
            tracing::debug!(process = %record.id, pid, "adopted worker record");
            return Ok(record);
        }
        tracing::warn!(process = %id, "inherited process record not found, registering standalone");
    }

    let cmd = target.command(&ctx.paths.keep_bin);
    let mut record = ProcessRecord::new(ProcessKind::Worker, cmd, "", ctx.machine.clone(), ctx.now())
        .with_worker_kind(target.worker_kind())
        .with_timeout(WORKER_TIMEOUT);
    record.pwd = ctx.paths.worker_dir(&record.id);
    record.mark_running(pid, started);
    ctx.store.insert_process(&record)?;
    Ok(record)
}

/// Whether this worker was spawned by a parent that already claimed its job.
pub fn claimed_by_parent<P, C>(ctx: &EngineContext<P, C>) -> bool {
    ctx.inherited_process.is_some()
}

/// Run the worker for `target` to completion in the current process.
///
/// The worker's own record is marked exited on the way out, 0 on success
/// and 1 on error.
pub async fn run_worker<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    target: WorkerTarget,
    cancel: CancellationToken,
) -> Result<(), EngineError> {
    let mut me = register_self(ctx, &target)?;
    tracing::info!(process = %me.id, worker = %target.worker_kind(), "worker starting");

    let outcome = match &target {
        WorkerTarget::Crawl(id) => crawl::run(ctx, id, &me, &cancel).await,
        WorkerTarget::Snapshot(id) => snapshot::run(ctx, id, &me, &cancel).await,
        WorkerTarget::Binary(id) => binary::run_one(ctx, id, &me, &cancel).await,
        WorkerTarget::BinaryQueue => binary::run_queue(ctx, &me, &cancel).await,
    };

    if let Err(e) = stop_own_hooks(ctx, &me).await {
        tracing::warn!(process = %me.id, error = %e, "failed to stop hooks on shutdown");
    }
    let code = if outcome.is_ok() { 0 } else { 1 };
    if let Some(stored) = ctx.store.get_process(&me.id)? {
        me = stored;
    }
    if !me.is_exited() {
        me.mark_exited(code, ctx.now());
        ctx.store.update_process(&me)?;
    }
    match &outcome {
        Ok(()) => tracing::info!(process = %me.id, "worker finished"),
        Err(e) => tracing::error!(process = %me.id, error = %e, "worker failed"),
    }
    outcome
}

/// Tree-kill hooks this worker launched that are still running.
pub(crate) async fn stop_own_hooks<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    me: &ProcessRecord,
) -> Result<usize, EngineError> {
    let mut hooks: Vec<ProcessRecord> = ctx
        .store
        .children(&me.id)?
        .into_iter()
        .filter(|p| p.kind == ProcessKind::Hook && p.is_running())
        .collect();
    if hooks.is_empty() {
        return Ok(0);
    }
    tracing::info!(process = %me.id, count = hooks.len(), "stopping hooks");
    ctx.supervisor().kill_trees(&mut hooks, |_| TERMINATE_GRACE).await
}

/// Sleep for `interval` unless cancelled first.
pub(crate) async fn pause(cancel: &CancellationToken, interval: Duration) -> Result<(), EngineError> {
    tokio::select! {
        _ = tokio::time::sleep(interval) => Ok(()),
        _ = cancel.cancelled() => Err(EngineError::Interrupted),
    }
}

/// Leave `job` in a recoverable state after its worker stopped early.
///
/// An interrupted worker puts the job back in the queue, due immediately.
/// Any other error fails the job so it does not stay started forever.
pub(crate) fn settle_job<J: PersistedJob>(
    store: &keep_storage::Store,
    job: &mut J,
    error: &EngineError,
    now_ms: u64,
) -> Result<(), EngineError> {
    if job.status().is_terminal() {
        return Ok(());
    }
    match error {
        EngineError::Interrupted => backoff(store, job, now_ms, now_ms),
        _ => {
            transition(store, job, JobStatus::Failed, now_ms)?;
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
