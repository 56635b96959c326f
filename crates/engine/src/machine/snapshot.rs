// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot work: one archive result per hook, then sealing.
//!
//! The snapshot worker drives the order: [`prepare_snapshot`] picks the
//! hooks still to run, [`start_hook`] and [`finish_hook`] bracket each one,
//! and [`seal_snapshot`] closes the snapshot once nothing is left running.

use super::{apply_hook_output, kill_hooks_under, remove_pid_files, seal_status, transition};
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::hooks::{discover_hooks, output_size, result_status, run_hook, HookArgs, HookOutput};
use keep_adapters::ProcessAdapter;
use keep_core::{
    ArchiveResult, Clock, ConfigMap, Crawl, Hook, HookEvent, JobStatus, ProcessId, ProcessRecord, ResultStatus, Snapshot,
};
use std::time::Duration;

/// Grace given to snapshot hooks still running when the snapshot seals.
pub const SEAL_KILL_GRACE: Duration = Duration::from_secs(2);

/// Worker defaults < crawl config < snapshot config.
pub fn snapshot_config<P, C>(ctx: &EngineContext<P, C>, crawl: Option<&Crawl>, snapshot: &Snapshot) -> ConfigMap {
    let mut layers = vec![&ctx.config];
    if let Some(crawl) = crawl {
        layers.push(&crawl.config);
    }
    layers.push(&snapshot.config);
    ConfigMap::layered(layers)
}

/// A hook paired with the result row it fills in.
#[derive(Debug, Clone)]
pub struct PendingHook {
    pub hook: Hook,
    pub result: ArchiveResult,
}

/// Hooks that still have to run for `snapshot`, in execution order.
///
/// Results that already succeeded or were skipped are left alone, so a
/// resumed snapshot only reruns what failed or never finished.
pub fn prepare_snapshot<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    snapshot: &Snapshot,
    config: &ConfigMap,
) -> Result<Vec<PendingHook>, EngineError> {
    let mut pending = Vec::new();
    for hook in discover_hooks(&ctx.paths.plugin_dirs, HookEvent::Snapshot, config) {
        let result = ctx.store.get_or_create_result(&snapshot.id, &hook.plugin, &hook.name, ctx.now())?;
        if matches!(result.status, ResultStatus::Succeeded | ResultStatus::Skipped) {
            tracing::debug!(snapshot = %snapshot.id, hook = %hook.name, status = %result.status, "already done");
            continue;
        }
        pending.push(PendingHook { hook, result });
    }
    Ok(pending)
}

/// Mark the result started and launch its hook in the snapshot directory.
pub async fn start_hook<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    snapshot: &Snapshot,
    pending: &mut PendingHook,
    config: &ConfigMap,
    worker: Option<&ProcessId>,
) -> Result<ProcessRecord, EngineError> {
    let now = ctx.now();
    let result = &mut pending.result;
    if result.status != ResultStatus::Queued {
        result.try_transition(ResultStatus::Queued, now)?;
    }
    result.try_transition(ResultStatus::Started, now)?;
    ctx.store.save_result(result)?;

    let args = HookArgs::new().arg("url", &snapshot.url).arg("snapshot-id", &snapshot.id);
    let pwd = ctx.paths.snapshot_dir(&snapshot.id).join(&pending.hook.plugin);
    let record = run_hook(ctx, &pending.hook, &args, &pwd, config, worker, None).await?;

    pending.result.process_id = Some(record.id.clone());
    ctx.store.save_result(&pending.result)?;
    Ok(record)
}

/// Record the outcome of a hook that has exited, or of a background hook
/// that is being given up on.
///
/// Records the hook emitted are applied to `crawl`; discovered snapshots
/// default to one level below `snapshot`.
pub fn finish_hook<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    crawl: &Crawl,
    snapshot: &Snapshot,
    pending: &mut PendingHook,
    process: &mut ProcessRecord,
) -> Result<ResultStatus, EngineError> {
    let output = HookOutput::read(process);
    let status = result_status(&output, process.exit_code, pending.hook.background);
    apply_hook_output(ctx, crawl, snapshot.depth + 1, process, &output)?;

    let result = &mut pending.result;
    if result.status == ResultStatus::Queued {
        result.try_transition(ResultStatus::Started, ctx.now())?;
    }
    result.try_transition(status, ctx.now())?;
    result.output_str = output.output_str().unwrap_or_default().to_string();
    result.output_size = output_size(&process.pwd);
    ctx.store.save_result(result)?;

    if status == ResultStatus::Failed {
        tracing::warn!(snapshot = %snapshot.id, hook = %pending.hook.name, code = ?process.exit_code, "hook failed");
    } else {
        tracing::info!(snapshot = %snapshot.id, hook = %pending.hook.name, %status, bytes = result.output_size, "hook finished");
    }
    Ok(status)
}

/// Clean up and seal a started snapshot.
///
/// Leftover hooks under the snapshot directory are tree-killed, results
/// that never started are dropped and results left started are failed.
/// The snapshot fails only when some hook failed and none succeeded.
pub async fn seal_snapshot<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    snapshot: &mut Snapshot,
) -> Result<JobStatus, EngineError> {
    let dir = ctx.paths.snapshot_dir(&snapshot.id);
    kill_hooks_under(ctx, &dir, SEAL_KILL_GRACE).await?;
    remove_pid_files(&dir);
    let dropped = ctx.store.delete_queued_results(&snapshot.id)?;

    let mut failed = 0;
    let mut succeeded = 0;
    for mut result in ctx.store.results_for_snapshot(&snapshot.id)? {
        if result.status == ResultStatus::Started {
            result.try_transition(ResultStatus::Failed, ctx.now())?;
            ctx.store.save_result(&result)?;
        }
        match result.status {
            ResultStatus::Failed => failed += 1,
            ResultStatus::Succeeded => succeeded += 1,
            _ => {}
        }
    }

    let status = seal_status(failed, succeeded);
    transition(&ctx.store, snapshot, status, ctx.now())?;
    tracing::info!(snapshot = %snapshot.id, %status, succeeded, failed, dropped, "snapshot sealed");
    Ok(snapshot.status)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
