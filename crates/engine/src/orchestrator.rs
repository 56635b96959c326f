// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator: polls the queues and spawns workers for due jobs.
//!
//! Binaries go first. A single binary worker drains the machine's install
//! queue, and crawls wait until it is empty so their hooks find the
//! dependencies in place. Crawls are then claimed one per tick and handed
//! to crawl worker subprocesses up to the configured ceiling.

use crate::context::{EngineContext, WorkerTarget};
use crate::error::EngineError;
use crate::machine::{backoff, claim};
use crate::supervisor::TERMINATE_GRACE;
use crate::worker::{pause, spawn_worker};
use keep_adapters::ProcessAdapter;
use keep_core::job::BACKOFF_DELAY;
use keep_core::{Clock, CrawlId, JobKind, ProcessKind, ProcessRecord, WorkerKind};
use keep_storage::QueueCounts;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Minimum time between stale-process sweeps while counting workers.
pub const CLEANUP_THROTTLE: Duration = Duration::from_secs(30);

/// Binary installs never run concurrently.
const MAX_BINARY_WORKERS: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Daemon mode never exits on idle and sweeps orphans on startup.
    pub daemon: bool,
    pub poll_interval: Duration,
    /// Consecutive idle ticks before a run-to-idle orchestrator exits.
    /// Zero disables idle exit.
    pub idle_ticks: u32,
    pub max_crawl_workers: usize,
    /// Limit queues and worker counts to one crawl.
    pub scope: Option<CrawlId>,
}

impl OrchestratorConfig {
    pub fn daemon() -> Self {
        Self { daemon: true, poll_interval: Duration::from_secs(2), idle_ticks: 3, max_crawl_workers: 8, scope: None }
    }

    /// Run-to-idle mode for `keep run`.
    pub fn foreground() -> Self {
        Self {
            daemon: false,
            poll_interval: Duration::from_millis(250),
            idle_ticks: 1,
            max_crawl_workers: 1,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: Option<CrawlId>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_max_crawl_workers(mut self, max: usize) -> Self {
        self.max_crawl_workers = max.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Whether another worker is warranted for a queue of `queue_count` jobs
/// with `running` workers already serving it.
///
/// Workers are added gradually: none is added while the running ones
/// already cover the backlog.
pub fn should_spawn_worker(queue_count: u64, running: usize, max_workers: usize) -> bool {
    if queue_count == 0 || running >= max_workers {
        return false;
    }
    !(running > 0 && queue_count <= running as u64)
}

pub struct Orchestrator<P, C> {
    ctx: EngineContext<P, C>,
    config: OrchestratorConfig,
    record: ProcessRecord,
    /// Workers spawned by this orchestrator not yet seen exiting.
    workers: Vec<(WorkerTarget, ProcessRecord)>,
    idle_count: u32,
    last_cleanup_ms: u64,
}

impl<P: ProcessAdapter, C: Clock> Orchestrator<P, C> {
    /// Register this process and reconcile leftovers from earlier runs.
    ///
    /// Stale records are always cleaned. Orphaned workers and browsers are
    /// only swept in daemon mode to keep foreground startup fast.
    pub async fn start(ctx: EngineContext<P, C>, config: OrchestratorConfig) -> Result<Self, EngineError> {
        let supervisor = ctx.supervisor();
        let stale = supervisor.cleanup_stale_running()?;
        let (browsers, orphans) = if config.daemon {
            (supervisor.cleanup_orphaned_browsers().await?, supervisor.cleanup_orphaned_workers().await?)
        } else {
            (0, 0)
        };

        let now = ctx.now();
        let pid = std::process::id();
        let started = ctx.adapter.start_time_ms(pid).unwrap_or(now);
        let mut record =
            ProcessRecord::new(ProcessKind::Orchestrator, std::env::args().collect(), &ctx.paths.logs_dir, ctx.machine.clone(), now);
        record.mark_running(pid, started);
        ctx.store.insert_process(&record)?;
        tracing::info!(
            process = %record.id,
            pid,
            daemon = config.daemon,
            scope = ?config.scope,
            max_crawl_workers = config.max_crawl_workers,
            poll_ms = config.poll_interval.as_millis() as u64,
            stale,
            browsers,
            orphans,
            "orchestrator starting"
        );
        Ok(Self { ctx, config, record, workers: Vec::new(), idle_count: 0, last_cleanup_ms: now })
    }

    pub fn record(&self) -> &ProcessRecord {
        &self.record
    }

    /// Poll until idle (run-to-idle mode) or cancelled, then stop every
    /// worker this orchestrator started. Cancellation is a clean shutdown.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
        let outcome = self.runloop(&cancel).await;
        let failed = matches!(&outcome, Err(e) if !matches!(e, EngineError::Interrupted));
        self.shutdown(failed).await?;
        match outcome {
            Err(EngineError::Interrupted) => {
                tracing::info!(process = %self.record.id, "orchestrator interrupted");
                Ok(())
            }
            other => other,
        }
    }

    async fn runloop(&mut self, cancel: &CancellationToken) -> Result<(), EngineError> {
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Interrupted);
            }
            let counts = self.tick().await?;
            let running = self.running_workers(None)?.len();
            if has_pending_work(&counts) || running > 0 {
                self.idle_count = 0;
            } else {
                self.idle_count += 1;
            }
            if self.should_exit(&counts, running)? {
                tracing::info!(process = %self.record.id, "all work complete");
                return Ok(());
            }
            pause(cancel, self.config.poll_interval).await?;
        }
    }

    /// One scheduling pass: reap exited workers, then spawn at most one
    /// binary worker or one crawl worker. Returns the queue sizes seen.
    pub async fn tick(&mut self) -> Result<QueueCounts, EngineError> {
        self.reap_workers()?;
        let now = self.ctx.now();
        let scope = self.config.scope.clone();
        let counts = self.ctx.store.queue_counts(&self.ctx.machine, now, scope.as_deref())?;

        let binary_workers = self.running_workers(Some(WorkerKind::Binary))?.len();
        let crawl_workers = self.running_workers(Some(WorkerKind::Crawl))?.len();
        if counts.binaries > 0 {
            if crawl_workers == 0 && should_spawn_worker(counts.binaries, binary_workers, MAX_BINARY_WORKERS) {
                self.spawn(WorkerTarget::BinaryQueue).await?;
            }
            return Ok(counts);
        }
        if binary_workers > 0 {
            return Ok(counts);
        }

        if should_spawn_worker(counts.crawls, crawl_workers, self.config.max_crawl_workers) {
            self.claim_and_spawn_crawl(now, scope.as_deref()).await?;
        }
        Ok(counts)
    }

    async fn claim_and_spawn_crawl(&mut self, now: u64, scope: Option<&str>) -> Result<(), EngineError> {
        for crawl in self.ctx.store.crawls_ready(now, scope, self.config.max_crawl_workers)? {
            if !claim(&self.ctx.store, &crawl, now)? {
                continue;
            }
            if !self.spawn(WorkerTarget::Crawl(crawl.id.clone())).await? {
                let retry_at = self.ctx.clock.after(BACKOFF_DELAY);
                self.ctx.store.set_retry_at(JobKind::Crawl, &crawl.id, retry_at, self.ctx.now())?;
            }
            break;
        }
        Ok(())
    }

    /// Spawn a worker under this orchestrator. A failed launch is logged
    /// and reported as `false`.
    async fn spawn(&mut self, target: WorkerTarget) -> Result<bool, EngineError> {
        match spawn_worker(&self.ctx, &target, Some(&self.record.id)).await {
            Ok(worker) => {
                self.workers.push((target, worker));
                Ok(true)
            }
            Err(EngineError::Launch { cmd, source }) => {
                tracing::error!(cmd, error = %source, "failed to spawn worker");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Close the records of exited workers. A crawl whose worker died
    /// before finishing is moved to `backoff` and becomes claimable again
    /// after the usual delay instead of waiting out the claim lockout.
    fn reap_workers(&mut self) -> Result<(), EngineError> {
        let supervisor = self.ctx.supervisor();
        let mut still_running = Vec::with_capacity(self.workers.len());
        for (target, mut worker) in std::mem::take(&mut self.workers) {
            let Some(code) = supervisor.poll(&mut worker)? else {
                still_running.push((target, worker));
                continue;
            };
            let WorkerTarget::Crawl(crawl_id) = &target else {
                tracing::info!(process = %worker.id, worker = %target.worker_kind(), code, "worker exited");
                continue;
            };
            let mut crawl = self.ctx.store.require_crawl(crawl_id)?;
            if !crawl.status.is_terminal() {
                let retry_at = self.ctx.clock.after(BACKOFF_DELAY);
                tracing::warn!(crawl = %crawl_id, code, status = %crawl.status, "crawl worker exited early");
                backoff(&self.ctx.store, &mut crawl, retry_at, self.ctx.now())?;
            } else {
                tracing::info!(crawl = %crawl_id, status = %crawl.status, "crawl worker finished");
            }
        }
        self.workers = still_running;
        Ok(())
    }

    /// Running workers of `kind` this orchestrator is responsible for:
    /// its own descendants when scoped, every worker on the machine
    /// otherwise. Binary workers are always counted machine-wide.
    fn running_workers(&mut self, kind: Option<WorkerKind>) -> Result<Vec<ProcessRecord>, EngineError> {
        let now = self.ctx.now();
        if now.saturating_sub(self.last_cleanup_ms) > CLEANUP_THROTTLE.as_millis() as u64 {
            self.ctx.supervisor().cleanup_stale_running()?;
            self.last_cleanup_ms = now;
        }

        let scoped = self.config.scope.is_some() && kind != Some(WorkerKind::Binary);
        let workers = if scoped {
            self.ctx
                .store
                .get_descendants(&self.record.id, false)?
                .into_iter()
                .filter(|p| p.is_running() && p.kind == ProcessKind::Worker)
                .filter(|p| kind.is_none() || p.worker_kind == kind)
                .collect()
        } else {
            self.ctx
                .store
                .get_running(Some(ProcessKind::Worker), kind)?
                .into_iter()
                .filter(|p| p.machine_id == self.ctx.machine)
                .collect()
        };
        Ok(workers)
    }

    /// Run-to-idle exit check: nothing due, nothing scheduled, no workers,
    /// for `idle_ticks` consecutive ticks. Daemons never exit on idle.
    pub fn should_exit(&self, counts: &QueueCounts, running_workers: usize) -> Result<bool, EngineError> {
        if self.config.daemon || self.config.idle_ticks == 0 {
            return Ok(false);
        }
        if has_pending_work(counts) || running_workers > 0 {
            return Ok(false);
        }
        let scope = self.config.scope.as_ref().map(|id| id.as_str());
        if self.ctx.store.has_future_work(&self.ctx.machine, self.ctx.now(), scope)? {
            return Ok(false);
        }
        Ok(self.idle_count >= self.config.idle_ticks)
    }

    /// Stop every worker under this orchestrator and close its record.
    async fn shutdown(&mut self, failed: bool) -> Result<(), EngineError> {
        let stopped = self.ctx.supervisor().stop_all(&self.record.id, TERMINATE_GRACE).await?;
        self.record.mark_exited(if failed { 1 } else { 0 }, self.ctx.now());
        self.ctx.store.update_process(&self.record)?;
        tracing::info!(process = %self.record.id, stopped, failed, "orchestrator stopped");
        Ok(())
    }
}

fn has_pending_work(counts: &QueueCounts) -> bool {
    counts.crawls > 0 || counts.binaries > 0
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
