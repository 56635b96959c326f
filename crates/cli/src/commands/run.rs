// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `keep run`: the orchestrator, or one worker bound to a job.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use keep_core::{BinaryId, CrawlId, SnapshotId};
use keep_daemon::logging::{self, ORCHESTRATOR_LOG};
use keep_daemon::{daemon_pid, run_daemon, shutdown_token, Settings};
use keep_engine::{run_worker, Orchestrator, WorkerTarget};
use tracing::warn;

use crate::exit_error::ExitError;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Keep polling after the queues drain (what keepd runs)
    #[arg(long, conflicts_with = "worker")]
    pub daemon: bool,

    /// Only process this crawl and its snapshots
    #[arg(long, value_name = "CRAWL_ID", conflicts_with_all = ["worker", "daemon"])]
    pub scope: Option<String>,

    /// Run a single crawl worker
    #[arg(long, value_name = "ID", group = "worker")]
    pub crawl_id: Option<String>,

    /// Run a single snapshot worker
    #[arg(long, value_name = "ID", group = "worker")]
    pub snapshot_id: Option<String>,

    /// Install a single binary
    #[arg(long, value_name = "ID", group = "worker")]
    pub binary_id: Option<String>,

    /// Run a queue-draining worker of this type
    #[arg(long, value_enum, group = "worker")]
    pub worker_type: Option<WorkerType>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WorkerType {
    Binary,
}

impl RunArgs {
    /// The job a worker run is bound to; `None` runs the orchestrator.
    pub fn target(&self) -> Option<WorkerTarget> {
        if let Some(id) = &self.crawl_id {
            return Some(WorkerTarget::Crawl(CrawlId::from_string(id)));
        }
        if let Some(id) = &self.snapshot_id {
            return Some(WorkerTarget::Snapshot(SnapshotId::from_string(id)));
        }
        if let Some(id) = &self.binary_id {
            return Some(WorkerTarget::Binary(BinaryId::from_string(id)));
        }
        self.worker_type.map(|WorkerType::Binary| WorkerTarget::BinaryQueue)
    }
}

pub async fn handle(args: RunArgs) -> Result<()> {
    let settings = Settings::load()?;
    if let Some(target) = args.target() {
        return worker(&settings, target).await;
    }

    let _log = logging::init_with_file(&settings.paths.logs_dir, ORCHESTRATOR_LOG)?;
    let cancel = shutdown_token()?;
    if args.daemon {
        run_daemon(&settings, cancel).await?;
        return Ok(());
    }

    if let Some(pid) = daemon_pid(&settings.lock_path()) {
        warn!(pid, "keepd is also running; both will take jobs from the same queues");
    }
    let store = settings.open_store()?;
    let scope = match args.scope {
        Some(id) => Some(store.require_crawl(&id).with_context(|| format!("unknown crawl {id}"))?.id),
        None => None,
    };
    let ctx = settings.engine_context(store);
    let orchestrator = Orchestrator::start(ctx, settings.orchestrator_config(false, scope)).await?;
    orchestrator.run(cancel).await?;
    Ok(())
}

async fn worker(settings: &Settings, target: WorkerTarget) -> Result<()> {
    let _log = logging::init_stderr();
    let store = settings.open_store()?;
    let ctx = settings.engine_context(store);
    let cancel = shutdown_token()?;
    run_worker(&ctx, target, cancel).await.map_err(|e| ExitError::failure(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
