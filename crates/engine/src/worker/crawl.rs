// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawl worker: crawl hooks, then a pool of snapshot workers, then seal.

use super::{claimed_by_parent, pause, settle_job, spawn_worker};
use crate::context::{EngineContext, WorkerTarget};
use crate::error::EngineError;
use crate::machine::crawl::{create_root_snapshots, is_crawl_finished, run_crawl, seal_crawl};
use crate::machine::{backoff, claim, start};
use keep_adapters::ProcessAdapter;
use keep_core::job::BACKOFF_DELAY;
use keep_core::{Clock, Crawl, CrawlId, JobKind, JobStatus, ProcessRecord, SnapshotId, WorkerKind};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

pub(super) async fn run<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    id: &CrawlId,
    me: &ProcessRecord,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let mut crawl = ctx.store.require_crawl(id)?;
    if !claimed_by_parent(ctx) && !claim(&ctx.store, &crawl, ctx.now())? {
        tracing::info!(crawl = %crawl.id, status = %crawl.status, "crawl not claimable, exiting");
        return Ok(());
    }
    let resumed = crawl.status == JobStatus::Started;
    if !start(&ctx.store, &mut crawl, BACKOFF_DELAY, ctx.now())? {
        tracing::info!(crawl = %crawl.id, status = %crawl.status, "crawl not started");
        return Ok(());
    }

    let outcome = drive(ctx, &mut crawl, me, resumed, cancel).await;
    if let Err(e) = &outcome {
        let mut latest = ctx.store.require_crawl(id)?;
        settle_job(&ctx.store, &mut latest, e, ctx.now())?;
    }
    outcome
}

async fn drive<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    crawl: &mut Crawl,
    me: &ProcessRecord,
    resumed: bool,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    if resumed {
        tracing::info!(crawl = %crawl.id, "resuming started crawl");
        create_root_snapshots(ctx, crawl)?;
    } else {
        run_crawl(ctx, crawl, Some(&me.id), cancel).await?;
    }

    let mut pool = SnapshotPool::default();
    loop {
        pool.reap(ctx)?;
        if is_crawl_finished(ctx, crawl)? {
            break;
        }
        pool.fill(ctx, crawl, me).await?;
        pause(cancel, ctx.tuning.crawl_poll_interval).await?;
    }

    seal_crawl(ctx, crawl, Some(&me.id), cancel).await?;
    Ok(())
}

/// Snapshot workers this crawl worker spawned and has not yet seen exit.
#[derive(Default)]
struct SnapshotPool {
    workers: Vec<(SnapshotId, ProcessRecord)>,
}

impl SnapshotPool {
    /// Forget exited workers. A snapshot whose worker died before finishing
    /// is moved to `backoff` and made claimable again after the usual delay.
    fn reap<P: ProcessAdapter, C: Clock>(&mut self, ctx: &EngineContext<P, C>) -> Result<(), EngineError> {
        let supervisor = ctx.supervisor();
        let mut still_running = Vec::with_capacity(self.workers.len());
        for (snapshot_id, mut worker) in std::mem::take(&mut self.workers) {
            let Some(code) = supervisor.poll(&mut worker)? else {
                still_running.push((snapshot_id, worker));
                continue;
            };
            let mut snapshot = ctx.store.require_snapshot(&snapshot_id)?;
            if !snapshot.status.is_terminal() {
                let retry_at = ctx.clock.after(BACKOFF_DELAY);
                tracing::warn!(snapshot = %snapshot_id, code, status = %snapshot.status, "snapshot worker exited early");
                backoff(&ctx.store, &mut snapshot, retry_at, ctx.now())?;
            }
        }
        self.workers = still_running;
        Ok(())
    }

    /// Claim due snapshots and spawn workers for them, up to the ceiling.
    /// Snapshots that already have a live worker anywhere are skipped.
    async fn fill<P: ProcessAdapter, C: Clock>(
        &mut self,
        ctx: &EngineContext<P, C>,
        crawl: &Crawl,
        me: &ProcessRecord,
    ) -> Result<(), EngineError> {
        let busy: HashSet<String> = ctx
            .store
            .get_running(None, Some(WorkerKind::Snapshot))?
            .iter()
            .filter_map(|p| p.cmd_flag_value(WorkerTarget::SNAPSHOT_FLAG).map(str::to_string))
            .collect();
        let snapshots = ctx.store.snapshots_for_crawl(&crawl.id)?;
        let active = snapshots.iter().filter(|s| busy.contains(s.id.as_str())).count();
        let mut slots = ctx.tuning.max_snapshot_workers.saturating_sub(active);

        for snapshot in snapshots {
            if slots == 0 {
                break;
            }
            if snapshot.status.is_terminal() || busy.contains(snapshot.id.as_str()) {
                continue;
            }
            if !claim(&ctx.store, &snapshot, ctx.now())? {
                continue;
            }
            match spawn_worker(ctx, &WorkerTarget::Snapshot(snapshot.id.clone()), Some(&me.id)).await {
                Ok(worker) => {
                    self.workers.push((snapshot.id, worker));
                    slots -= 1;
                }
                Err(EngineError::Launch { .. }) => {
                    let retry_at = ctx.clock.after(BACKOFF_DELAY);
                    ctx.store.set_retry_at(JobKind::Snapshot, &snapshot.id, retry_at, ctx.now())?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "crawl_tests.rs"]
mod tests;
