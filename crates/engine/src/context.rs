// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Explicit per-process context handed to workers and the orchestrator.

use crate::supervisor::Supervisor;
use keep_adapters::ProcessAdapter;
use keep_core::{BinaryId, Clock, ConfigMap, CrawlId, MachineId, ProcessId, SnapshotId};
use keep_storage::Store;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// On-disk layout under the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub crawls_dir: PathBuf,
    pub binaries_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Searched in order; a hook found in a later root replaces one with the
    /// same file name from an earlier root.
    pub plugin_dirs: Vec<PathBuf>,
    /// Executable used to start worker processes.
    pub keep_bin: PathBuf,
}

impl Paths {
    pub fn under(data_dir: impl Into<PathBuf>, machine: &MachineId) -> Self {
        let data_dir = data_dir.into();
        Self {
            archive_dir: data_dir.join("archive"),
            crawls_dir: data_dir.join("crawls"),
            binaries_dir: data_dir.join("machines").join(machine.as_str()).join("binaries"),
            logs_dir: data_dir.join("logs"),
            plugin_dirs: vec![data_dir.join("plugins")],
            keep_bin: PathBuf::from("keep"),
            data_dir,
        }
    }

    pub fn with_builtin_plugins(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.plugin_dirs.insert(0, dir);
        }
        self
    }

    pub fn with_keep_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.keep_bin = bin.into();
        self
    }

    pub fn snapshot_dir(&self, id: &SnapshotId) -> PathBuf {
        self.archive_dir.join(id.as_str())
    }

    pub fn crawl_dir(&self, id: &CrawlId) -> PathBuf {
        self.crawls_dir.join(id.as_str())
    }

    pub fn binary_dir(&self, name: &str) -> PathBuf {
        self.binaries_dir.join(name)
    }

    /// Working directory (and log location) of a worker process.
    pub fn worker_dir(&self, id: &ProcessId) -> PathBuf {
        self.logs_dir.join("workers").join(id.as_str())
    }
}

/// Timing and concurrency knobs shared by every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    /// Running records older than this are assumed to refer to a reused pid.
    pub pid_reuse_window: Duration,
    /// Allowed drift between a record's `started_at` and the OS start time.
    pub start_time_tolerance: Duration,
    pub max_snapshot_workers: usize,
    pub crawl_poll_interval: Duration,
    pub binary_poll_interval: Duration,
    /// Consecutive empty polls before a queue-mode binary worker exits.
    pub binary_idle_polls: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            pid_reuse_window: Duration::from_secs(24 * 60 * 60),
            start_time_tolerance: Duration::from_secs(5),
            max_snapshot_workers: 8,
            crawl_poll_interval: Duration::from_secs(2),
            binary_poll_interval: Duration::from_millis(500),
            binary_idle_polls: 10,
        }
    }
}

/// Everything a worker or orchestrator needs, with a lifetime of one OS
/// process. Built once by the binary and cloned into each component.
#[derive(Clone)]
pub struct EngineContext<P, C> {
    pub store: Store,
    pub adapter: P,
    pub clock: C,
    pub machine: MachineId,
    pub paths: Paths,
    /// Built-in defaults < `keep.toml` < environment.
    pub config: ConfigMap,
    pub tuning: Tuning,
    /// Record the parent created for this process (`KEEP_PROCESS_ID`).
    pub inherited_process: Option<ProcessId>,
}

impl<P: ProcessAdapter, C: Clock> EngineContext<P, C> {
    pub fn new(store: Store, adapter: P, clock: C, machine: MachineId, paths: Paths) -> Self {
        Self {
            store,
            adapter,
            clock,
            machine,
            paths,
            config: ConfigMap::new(),
            tuning: Tuning::default(),
            inherited_process: None,
        }
    }

    pub fn with_config(mut self, config: ConfigMap) -> Self {
        self.config = config;
        self
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_inherited_process(mut self, id: Option<ProcessId>) -> Self {
        self.inherited_process = id;
        self
    }

    pub fn now(&self) -> u64 {
        self.clock.epoch_ms()
    }

    pub fn supervisor(&self) -> Supervisor<P, C> {
        Supervisor::new(self.store.clone(), self.adapter.clone(), self.clock.clone(), self.machine.clone(), &self.tuning)
    }

    /// Environment every child process gets on top of the inherited one.
    pub fn base_env(&self) -> Vec<(String, String)> {
        vec![
            ("DATA_DIR".to_string(), self.paths.data_dir.display().to_string()),
            ("ARCHIVE_DIR".to_string(), self.paths.archive_dir.display().to_string()),
            ("MACHINE_ID".to_string(), self.machine.to_string()),
            ("KEEP_DATA_DIR".to_string(), self.paths.data_dir.display().to_string()),
        ]
    }
}

/// Ids a worker command line can be bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerTarget {
    Crawl(CrawlId),
    Snapshot(SnapshotId),
    Binary(BinaryId),
    /// Drain every queued binary on this machine.
    BinaryQueue,
}

impl WorkerTarget {
    pub const CRAWL_FLAG: &'static str = "--crawl-id";
    pub const SNAPSHOT_FLAG: &'static str = "--snapshot-id";
    pub const BINARY_FLAG: &'static str = "--binary-id";
    pub const WORKER_TYPE_FLAG: &'static str = "--worker-type";

    pub fn worker_kind(&self) -> keep_core::WorkerKind {
        use keep_core::WorkerKind;
        match self {
            WorkerTarget::Crawl(_) => WorkerKind::Crawl,
            WorkerTarget::Snapshot(_) => WorkerKind::Snapshot,
            WorkerTarget::Binary(_) | WorkerTarget::BinaryQueue => WorkerKind::Binary,
        }
    }

    /// Arguments after the executable: `run --crawl-id <id>` and so on.
    pub fn args(&self) -> Vec<String> {
        let (flag, value) = match self {
            WorkerTarget::Crawl(id) => (Self::CRAWL_FLAG, id.to_string()),
            WorkerTarget::Snapshot(id) => (Self::SNAPSHOT_FLAG, id.to_string()),
            WorkerTarget::Binary(id) => (Self::BINARY_FLAG, id.to_string()),
            WorkerTarget::BinaryQueue => (Self::WORKER_TYPE_FLAG, "binary".to_string()),
        };
        vec!["run".to_string(), flag.to_string(), value]
    }

    pub fn command(&self, keep_bin: &Path) -> Vec<String> {
        let mut cmd = vec![keep_bin.display().to_string()];
        cmd.extend(self.args());
        cmd
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
