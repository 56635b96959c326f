// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Launching, polling and terminating recorded processes.
//!
//! Every OS process the engine starts goes through [`Supervisor::launch`],
//! which persists a [`ProcessRecord`] before the spawn and keeps it in step
//! with what the adapter observes. Termination is signal based and covers the
//! whole OS descendant tree of a record, since hooks routinely fork helpers
//! (browsers, downloaders) that would otherwise outlive them.

use crate::context::Tuning;
use crate::error::EngineError;
use keep_adapters::{ProcessAdapter, ProcessAdapterError, ProcessState, Signal, SpawnSpec};
use keep_core::process::{signal_exit_code, EXIT_SIGKILL, EXIT_SIGTERM};
use keep_core::{Clock, MachineId, ProcessId, ProcessKind, ProcessRecord};
use keep_storage::Store;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Interval between liveness checks while waiting.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default SIGTERM grace before SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);
/// Grace given to processes whose owner is gone.
pub const ORPHAN_GRACE: Duration = Duration::from_secs(1);
/// Exit code recorded when a launch never produced a process.
pub const EXIT_LAUNCH_FAILED: i32 = 127;

const REAP_WAIT: Duration = Duration::from_secs(2);
const OUTPUT_TAIL_BYTES: usize = 64 * 1024;
const BROWSER_PLUGIN: &str = "chrome";

#[derive(Clone)]
pub struct Supervisor<P, C> {
    store: Store,
    adapter: P,
    clock: C,
    machine: MachineId,
    pid_reuse_window_ms: u64,
    start_time_tolerance_ms: u64,
}

impl<P: ProcessAdapter, C: Clock> Supervisor<P, C> {
    pub fn new(store: Store, adapter: P, clock: C, machine: MachineId, tuning: &Tuning) -> Self {
        Self {
            store,
            adapter,
            clock,
            machine,
            pid_reuse_window_ms: tuning.pid_reuse_window.as_millis() as u64,
            start_time_tolerance_ms: tuning.start_time_tolerance.as_millis() as u64,
        }
    }

    /// Persist `record` as queued, start it and mark it running.
    ///
    /// Foreground launches then wait out the record's timeout, escalating to
    /// tree termination when it is exceeded. A failed spawn leaves the record
    /// exited with [`EXIT_LAUNCH_FAILED`] and the reason in `stderr`.
    pub async fn launch(&self, record: &mut ProcessRecord, background: bool) -> Result<u32, EngineError> {
        self.store.insert_process(record)?;
        let pid = match self.start(record).await {
            Ok(pid) => pid,
            Err(source) => {
                tracing::warn!(process = %record.id, cmd = %record.cmd_line(), error = %source, "launch failed");
                record.stderr = source.to_string();
                record.mark_exited(EXIT_LAUNCH_FAILED, self.clock.epoch_ms());
                self.store.update_process(record)?;
                return Err(EngineError::Launch { cmd: record.cmd_line(), source });
            }
        };
        self.store.update_process(record)?;
        tracing::debug!(process = %record.id, pid, kind = %record.kind, background, "launched");

        if !background {
            self.run_to_completion(record, &CancellationToken::new()).await?;
        }
        Ok(pid)
    }

    async fn start(&self, record: &mut ProcessRecord) -> Result<u32, ProcessAdapterError> {
        tokio::fs::create_dir_all(&record.pwd)
            .await
            .map_err(|source| ProcessAdapterError::WorkingDir { path: record.pwd.clone(), source })?;
        let script = format!("#!/usr/bin/env bash\ncd {}\n{}\n", quote_path(&record.pwd), record.cmd_line());
        tokio::fs::write(record.cmd_path(), script)
            .await
            .map_err(|source| ProcessAdapterError::WorkingDir { path: record.cmd_path(), source })?;

        let pid = self.adapter.spawn(&SpawnSpec::for_record(record)).await?;
        record.mark_running(pid, self.clock.epoch_ms());
        if let Err(e) = tokio::fs::write(record.pid_path(), format!("{pid}\n")).await {
            tracing::warn!(path = %record.pid_path().display(), error = %e, "failed to write pid file");
        }
        Ok(pid)
    }

    /// Non-blocking exit check. Marks the record exited once the process is
    /// gone; a vanished process whose status cannot be reaped counts as 0.
    pub fn poll(&self, record: &mut ProcessRecord) -> Result<Option<i32>, EngineError> {
        if record.is_exited() {
            return Ok(record.exit_code);
        }
        let Some(pid) = record.pid else {
            return Ok(None);
        };
        let code = match self.adapter.state(pid) {
            ProcessState::Running => return Ok(None),
            ProcessState::Exited(code) => code,
            ProcessState::Gone => 0,
        };
        self.finish(record, code)?;
        Ok(record.exit_code)
    }

    /// Block until exit. Times out without killing; the caller decides.
    pub async fn wait(&self, record: &mut ProcessRecord, timeout: Duration) -> Result<i32, EngineError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(code) = self.poll(record)? {
                return Ok(code);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::Timeout { id: record.id.clone(), timeout });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Wait for a foreground process within its own remaining budget.
    ///
    /// Past the budget the tree is terminated and the resulting code
    /// returned. Cancellation also terminates the tree and yields
    /// [`EngineError::Interrupted`].
    pub async fn run_to_completion(
        &self,
        record: &mut ProcessRecord,
        cancel: &CancellationToken,
    ) -> Result<i32, EngineError> {
        let budget = record.remaining(self.clock.epoch_ms());
        let outcome = tokio::select! {
            result = self.wait(record, budget) => Some(result),
            _ = cancel.cancelled() => None,
        };
        match outcome {
            Some(Ok(code)) => Ok(code),
            Some(Err(EngineError::Timeout { .. })) => {
                tracing::warn!(process = %record.id, timeout = ?record.timeout, "timed out, terminating process tree");
                self.kill_tree(record, TERMINATE_GRACE).await?;
                Ok(record.exit_code.unwrap_or(EXIT_SIGKILL))
            }
            Some(Err(e)) => Err(e),
            None => {
                self.kill_tree(record, TERMINATE_GRACE).await?;
                Err(EngineError::Interrupted)
            }
        }
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL. Returns whether the
    /// process was already dead.
    pub async fn terminate(&self, record: &mut ProcessRecord, grace: Duration) -> Result<bool, EngineError> {
        if self.poll(record)?.is_some() {
            return Ok(true);
        }
        let Some(pid) = record.pid else {
            return Ok(true);
        };
        if !self.adapter.signal(pid, Signal::Term)? {
            if self.poll(record)?.is_none() {
                self.finish(record, 0)?;
            }
            return Ok(true);
        }
        if self.exits_within(record, grace).await? {
            return Ok(false);
        }
        tracing::warn!(process = %record.id, pid, "still alive after SIGTERM, sending SIGKILL");
        self.adapter.signal(pid, Signal::Kill)?;
        if !self.exits_within(record, REAP_WAIT).await? {
            self.finish(record, EXIT_SIGKILL)?;
        }
        Ok(false)
    }

    /// Send one signal and record the exit as `128 + signal`.
    pub async fn kill(&self, record: &mut ProcessRecord, signal: Signal) -> Result<bool, EngineError> {
        if self.poll(record)?.is_some() {
            return Ok(false);
        }
        let Some(pid) = record.pid else {
            return Ok(false);
        };
        let delivered = self.adapter.signal(pid, signal)?;
        let code = if delivered { signal_exit_code(signal.number()) } else { 0 };
        let deadline = Instant::now() + REAP_WAIT;
        while self.adapter.is_alive(pid) && Instant::now() < deadline {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        if !record.is_exited() {
            self.finish(record, code)?;
        }
        Ok(delivered)
    }

    /// Terminate `record` and every OS descendant. Returns how many
    /// processes were signalled.
    pub async fn kill_tree(&self, record: &mut ProcessRecord, grace: Duration) -> Result<usize, EngineError> {
        self.kill_trees(std::slice::from_mut(record), |_| grace).await
    }

    /// Terminate several trees at once, each with its own grace period.
    ///
    /// All trees get SIGTERM up front (descendants before their root). Each
    /// tree is then settled as soon as it is empty or its own deadline
    /// passes, with survivors getting SIGKILL deepest first. The root is recorded as
    /// exiting 137 if anything needed SIGKILL, 143 if anything was signalled
    /// and 0 otherwise.
    pub async fn kill_trees(
        &self,
        records: &mut [ProcessRecord],
        grace: impl Fn(&ProcessRecord) -> Duration,
    ) -> Result<usize, EngineError> {
        struct Tree {
            root: u32,
            members: Vec<u32>,
            deadline: Instant,
            signalled: HashSet<u32>,
        }

        let start = Instant::now();
        let mut trees = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            let root = match (self.poll(record)?, record.pid) {
                (None, Some(pid)) => pid,
                _ => {
                    trees.push(None);
                    continue;
                }
            };
            let members = self.adapter.descendants(root);
            let mut signalled = HashSet::new();
            for &pid in members.iter().chain(std::iter::once(&root)) {
                if self.adapter.signal(pid, Signal::Term)? {
                    signalled.insert(pid);
                }
            }
            trees.push(Some(Tree { root, members, deadline: start + grace(record), signalled }));
        }

        let mut total = 0;
        let mut pending: Vec<usize> = (0..trees.len()).filter(|&i| trees[i].is_some()).collect();
        while !pending.is_empty() {
            let now = Instant::now();
            let mut waiting = Vec::with_capacity(pending.len());
            for i in pending {
                let Some(tree) = trees[i].as_mut() else {
                    continue;
                };
                let alive = self.any_alive(tree.members.iter().chain(std::iter::once(&tree.root)));
                if alive && now < tree.deadline {
                    waiting.push(i);
                    continue;
                }
                let record = &mut records[i];
                let mut forced = false;
                for &pid in tree.members.iter().rev().chain(std::iter::once(&tree.root)) {
                    if self.adapter.is_alive(pid) && self.adapter.signal(pid, Signal::Kill)? {
                        tree.signalled.insert(pid);
                        forced = true;
                    }
                }
                if forced {
                    let reap_deadline = Instant::now() + REAP_WAIT;
                    while self.adapter.is_alive(tree.root) && Instant::now() < reap_deadline {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                    tracing::warn!(process = %record.id, pid = tree.root, "force-killed process tree");
                }
                let code = if forced {
                    EXIT_SIGKILL
                } else if tree.signalled.is_empty() {
                    0
                } else {
                    EXIT_SIGTERM
                };
                if !record.is_exited() {
                    self.finish(record, code)?;
                }
                self.mark_descendant_records(record, &tree.members, code)?;
                total += tree.signalled.len();
            }
            pending = waiting;
            if !pending.is_empty() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
        Ok(total)
    }

    fn any_alive<'a>(&self, pids: impl IntoIterator<Item = &'a u32>) -> bool {
        pids.into_iter().any(|&pid| self.adapter.is_alive(pid))
    }

    /// Close out running child records whose process died with the tree.
    fn mark_descendant_records(&self, record: &ProcessRecord, pids: &[u32], code: i32) -> Result<(), EngineError> {
        for mut child in self.store.get_descendants(&record.id, false)? {
            if child.is_running() && child.pid.is_some_and(|pid| pids.contains(&pid)) {
                self.finish(&mut child, code)?;
            }
        }
        Ok(())
    }

    async fn exits_within(&self, record: &mut ProcessRecord, limit: Duration) -> Result<bool, EngineError> {
        match self.wait(record, limit).await {
            Ok(_) => Ok(true),
            Err(EngineError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Mark exited, capture output tails and drop the pid file.
    fn finish(&self, record: &mut ProcessRecord, code: i32) -> Result<(), EngineError> {
        record.mark_exited(code, self.clock.epoch_ms());
        record.stdout = read_tail(&record.stdout_path());
        let stderr = read_tail(&record.stderr_path());
        if !stderr.is_empty() {
            record.stderr = stderr;
        }
        if let Err(e) = std::fs::remove_file(record.pid_path()) {
            if e.kind() != ErrorKind::NotFound {
                tracing::debug!(path = %record.pid_path().display(), error = %e, "failed to remove pid file");
            }
        }
        self.store.update_process(record)?;
        Ok(())
    }

    /// Mark running records exited when their pid is dead, was reused by an
    /// unrelated process, or is too old to trust. Never signals anything.
    pub fn cleanup_stale_running(&self) -> Result<usize, EngineError> {
        let now = self.clock.epoch_ms();
        let mut cleaned = 0;
        for mut record in self.store.get_running(None, None)? {
            if record.machine_id != self.machine {
                continue;
            }
            let Some(code) = self.stale_exit_code(&record, now) else {
                continue;
            };
            tracing::info!(process = %record.id, pid = ?record.pid, kind = %record.kind, "marking stale process exited");
            self.finish(&mut record, code)?;
            cleaned += 1;
        }
        Ok(cleaned)
    }

    fn stale_exit_code(&self, record: &ProcessRecord, now: u64) -> Option<i32> {
        let (Some(pid), Some(started)) = (record.pid, record.started_at_ms) else {
            return Some(0);
        };
        if now.saturating_sub(started) > self.pid_reuse_window_ms {
            return Some(0);
        }
        match self.adapter.state(pid) {
            ProcessState::Running => {}
            ProcessState::Exited(code) => return Some(code),
            ProcessState::Gone => return Some(0),
        }
        match self.adapter.start_time_ms(pid) {
            Some(os_start) if os_start.abs_diff(started) > self.start_time_tolerance_ms => Some(0),
            _ => None,
        }
    }

    /// Stop workers and hooks whose tree root is no longer running.
    pub async fn cleanup_orphaned_workers(&self) -> Result<usize, EngineError> {
        let mut cleaned = 0;
        for mut record in self.store.get_running(None, None)? {
            if record.machine_id != self.machine || !matches!(record.kind, ProcessKind::Worker | ProcessKind::Hook) {
                continue;
            }
            let Some(root) = self.store.root(&record.id)? else {
                continue;
            };
            if root.id == record.id || root.is_running() {
                continue;
            }
            tracing::warn!(process = %record.id, kind = %record.kind, root = %root.id, "stopping orphaned process");
            match record.kind {
                ProcessKind::Hook => {
                    self.kill_tree(&mut record, ORPHAN_GRACE).await?;
                }
                _ => {
                    self.terminate(&mut record, ORPHAN_GRACE).await?;
                }
            }
            cleaned += 1;
        }
        Ok(cleaned)
    }

    /// Tree-kill browser hooks left running under an exited parent.
    pub async fn cleanup_orphaned_browsers(&self) -> Result<usize, EngineError> {
        let mut cleaned = 0;
        for mut record in self.store.get_running(Some(ProcessKind::Hook), None)? {
            if record.machine_id != self.machine || !is_browser_hook(&record) {
                continue;
            }
            let parent_alive = match &record.parent_id {
                Some(parent) => self.store.get_process(parent)?.is_some_and(|p| p.is_running()),
                None => false,
            };
            if parent_alive {
                continue;
            }
            tracing::warn!(process = %record.id, pid = ?record.pid, "killing orphaned browser");
            self.kill_tree(&mut record, ORPHAN_GRACE).await?;
            cleaned += 1;
        }
        Ok(cleaned)
    }

    /// Tree-kill every running child record of `parent`.
    pub async fn kill_children(&self, parent: &ProcessId, grace: Duration) -> Result<usize, EngineError> {
        let mut children: Vec<ProcessRecord> =
            self.store.children(parent)?.into_iter().filter(ProcessRecord::is_running).collect();
        self.kill_trees(&mut children, |_| grace).await
    }

    /// Gracefully stop every running worker under `root`: SIGTERM all of
    /// them, give each `grace` to wind down, then tree-kill the rest.
    pub async fn stop_all(&self, root: &ProcessId, grace: Duration) -> Result<usize, EngineError> {
        let mut workers: Vec<ProcessRecord> = self
            .store
            .get_descendants(root, false)?
            .into_iter()
            .filter(|p| p.is_running() && p.kind == ProcessKind::Worker)
            .collect();
        if workers.is_empty() {
            return Ok(0);
        }
        tracing::info!(count = workers.len(), "stopping workers");
        for worker in &workers {
            if let Some(pid) = worker.pid {
                self.adapter.signal(pid, Signal::Term)?;
            }
        }
        let deadline = Instant::now() + grace;
        loop {
            let mut alive = false;
            for worker in workers.iter_mut() {
                alive |= self.poll(worker)?.is_none();
            }
            if !alive || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        let mut stragglers: Vec<ProcessRecord> = workers.iter().filter(|w| !w.is_exited()).cloned().collect();
        self.kill_trees(&mut stragglers, |_| Duration::ZERO).await?;
        Ok(workers.len())
    }
}

fn is_browser_hook(record: &ProcessRecord) -> bool {
    record.pwd.file_name().is_some_and(|name| name == BROWSER_PLUGIN)
}

fn quote_path(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

fn read_tail(path: &Path) -> String {
    let Ok(bytes) = std::fs::read(path) else {
        return String::new();
    };
    let start = bytes.len().saturating_sub(OUTPUT_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
