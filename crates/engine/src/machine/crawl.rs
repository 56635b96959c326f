// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawl work: crawl-level hooks, root snapshots and sealing.

use super::{apply_hook_output, binary, kill_hooks_under, remove_pid_files, seal_status, transition};
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::hooks::{discover_hooks, run_hook, HookArgs, HookOutput};
use keep_adapters::ProcessAdapter;
use keep_core::{Clock, ConfigMap, Crawl, HookEvent, JobStatus, ProcessId, Snapshot};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Grace given to crawl hooks still running when the crawl seals.
pub const SEAL_KILL_GRACE: Duration = Duration::from_secs(2);

/// Worker defaults overlaid with the crawl's own config.
pub fn crawl_config<P, C>(ctx: &EngineContext<P, C>, crawl: &Crawl) -> ConfigMap {
    ConfigMap::layered([&ctx.config, &crawl.config])
}

fn hook_args(crawl: &Crawl) -> HookArgs {
    HookArgs::new().arg("crawl-id", &crawl.id).arg("source-url", &crawl.urls)
}

/// Run the crawl's hooks, then create its root snapshots.
///
/// Foreground hooks are waited on and their records applied; background
/// hooks keep running until the crawl seals. Binaries the hooks queued are
/// installed before any snapshot exists so snapshot hooks can rely on them.
pub async fn run_crawl<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    crawl: &Crawl,
    worker: Option<&ProcessId>,
    cancel: &CancellationToken,
) -> Result<Vec<Snapshot>, EngineError> {
    let config = crawl_config(ctx, crawl);
    let hooks = discover_hooks(&ctx.paths.plugin_dirs, HookEvent::Crawl, &config);
    let args = hook_args(crawl);
    let supervisor = ctx.supervisor();
    tracing::info!(crawl = %crawl.id, hooks = hooks.len(), "running crawl hooks");

    for hook in &hooks {
        if cancel.is_cancelled() {
            return Err(EngineError::Interrupted);
        }
        let pwd = ctx.paths.crawl_dir(&crawl.id).join(&hook.plugin);
        let mut record = run_hook(ctx, hook, &args, &pwd, &config, worker, None).await?;
        if hook.background && record.is_running() {
            continue;
        }
        let code = match record.exit_code {
            Some(code) => code,
            None => supervisor.run_to_completion(&mut record, cancel).await?,
        };
        if code != 0 {
            tracing::warn!(crawl = %crawl.id, hook = %hook.name, code, "crawl hook failed");
        }
        let output = HookOutput::read(&record);
        apply_hook_output(ctx, crawl, 0, &mut record, &output)?;
    }

    binary::install_ready(ctx, worker, cancel).await?;
    create_root_snapshots(ctx, crawl)
}

/// One depth-0 snapshot per seed URL. Existing ones are kept.
pub fn create_root_snapshots<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    crawl: &Crawl,
) -> Result<Vec<Snapshot>, EngineError> {
    let now = ctx.now();
    for url in crawl.url_list() {
        let (snapshot, created) = ctx.store.get_or_create_snapshot(&Snapshot::new(crawl.id.clone(), url, 0, now))?;
        if created {
            tracing::info!(crawl = %crawl.id, snapshot = %snapshot.id, url, "queued snapshot");
        }
    }
    Ok(ctx.store.snapshots_for_crawl(&crawl.id)?)
}

/// Whether every snapshot of the crawl is finished. True for a crawl with
/// no snapshots.
pub fn is_crawl_finished<P, C>(ctx: &EngineContext<P, C>, crawl: &Crawl) -> Result<bool, EngineError> {
    Ok(ctx.store.snapshots_for_crawl(&crawl.id)?.iter().all(|s| s.status.is_terminal()))
}

/// Clean up and seal a started crawl whose snapshots are all finished.
///
/// Leftover crawl hooks are tree-killed, stray pid files removed and
/// `CrawlEnd` hooks run; their failures are only logged.
pub async fn seal_crawl<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    crawl: &mut Crawl,
    worker: Option<&ProcessId>,
    cancel: &CancellationToken,
) -> Result<JobStatus, EngineError> {
    let crawl_dir = ctx.paths.crawl_dir(&crawl.id);
    kill_hooks_under(ctx, &crawl_dir, SEAL_KILL_GRACE).await?;
    remove_pid_files(&crawl_dir);

    let config = crawl_config(ctx, crawl);
    let args = hook_args(crawl);
    let supervisor = ctx.supervisor();
    for hook in discover_hooks(&ctx.paths.plugin_dirs, HookEvent::CrawlEnd, &config) {
        let pwd = crawl_dir.join(&hook.plugin);
        let mut record = run_hook(ctx, &hook, &args, &pwd, &config, worker, None).await?;
        let code = match record.exit_code {
            Some(code) => code,
            None => supervisor.run_to_completion(&mut record, cancel).await?,
        };
        if code != 0 {
            tracing::warn!(crawl = %crawl.id, hook = %hook.name, code, "crawl end hook failed");
        }
    }

    let snapshots = ctx.store.snapshots_for_crawl(&crawl.id)?;
    let failed = snapshots.iter().filter(|s| s.status == JobStatus::Failed).count();
    let sealed = snapshots.iter().filter(|s| s.status == JobStatus::Sealed).count();
    let status = seal_status(failed, sealed);
    transition(&ctx.store, crawl, status, ctx.now())?;
    tracing::info!(crawl = %crawl.id, %status, snapshots = snapshots.len(), failed, "crawl sealed");
    Ok(crawl.status)
}

#[cfg(test)]
#[path = "crawl_tests.rs"]
mod tests;
