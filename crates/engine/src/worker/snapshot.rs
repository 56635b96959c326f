// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot worker: hooks in ordinal order, then seal.

use super::{claimed_by_parent, settle_job, BackgroundHooks};
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::machine::snapshot::{finish_hook, prepare_snapshot, seal_snapshot, snapshot_config, start_hook};
use crate::machine::{claim, start};
use keep_adapters::ProcessAdapter;
use keep_core::job::BACKOFF_DELAY;
use keep_core::{Clock, Crawl, ProcessRecord, Snapshot, SnapshotId};
use tokio_util::sync::CancellationToken;

pub(super) async fn run<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    id: &SnapshotId,
    me: &ProcessRecord,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let mut snapshot = ctx.store.require_snapshot(id)?;
    if !claimed_by_parent(ctx) && !claim(&ctx.store, &snapshot, ctx.now())? {
        tracing::info!(snapshot = %snapshot.id, status = %snapshot.status, "snapshot not claimable, exiting");
        return Ok(());
    }
    if !start(&ctx.store, &mut snapshot, BACKOFF_DELAY, ctx.now())? {
        tracing::info!(snapshot = %snapshot.id, status = %snapshot.status, "snapshot not started");
        return Ok(());
    }
    let crawl = ctx.store.require_crawl(&snapshot.crawl_id)?;

    let mut background = BackgroundHooks::new();
    let mut outcome = run_hooks(ctx, &crawl, &snapshot, me, &mut background, cancel).await;
    if let Err(e) = background.terminate_all(ctx, &crawl, &snapshot).await {
        tracing::warn!(snapshot = %snapshot.id, error = %e, "failed to terminate background hooks");
        outcome = outcome.and(Err(e));
    }

    match outcome {
        Ok(()) => {
            seal_snapshot(ctx, &mut snapshot).await?;
            Ok(())
        }
        Err(e) => {
            let mut latest = ctx.store.require_snapshot(id)?;
            settle_job(&ctx.store, &mut latest, &e, ctx.now())?;
            Err(e)
        }
    }
}

/// Run every pending hook in order. Foreground hooks are waited on within
/// their own timeout; background hooks are handed to `background` and
/// reaped between steps.
async fn run_hooks<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    crawl: &Crawl,
    snapshot: &Snapshot,
    me: &ProcessRecord,
    background: &mut BackgroundHooks,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let config = snapshot_config(ctx, Some(crawl), snapshot);
    let pending = prepare_snapshot(ctx, snapshot, &config)?;
    tracing::info!(snapshot = %snapshot.id, url = %snapshot.url, hooks = pending.len(), "running snapshot hooks");
    let supervisor = ctx.supervisor();

    for mut hook in pending {
        if cancel.is_cancelled() {
            return Err(EngineError::Interrupted);
        }
        let mut process = start_hook(ctx, snapshot, &mut hook, &config, Some(&me.id)).await?;
        if hook.hook.background && process.is_running() {
            background.insert(hook, process);
        } else {
            if process.exit_code.is_none() {
                supervisor.run_to_completion(&mut process, cancel).await?;
            }
            finish_hook(ctx, crawl, snapshot, &mut hook, &mut process)?;
        }
        background.reap(ctx, crawl, snapshot)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
