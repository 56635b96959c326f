// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake process adapter for engine tests.
//!
//! Spawned processes never touch the OS. Each spawn is matched against a
//! list of rules (first command argument containing the rule's needle wins)
//! that decide whether it exits at once, keeps running, ignores SIGTERM or
//! fails to launch. Stdout configured on a rule is appended to the spec's
//! stdout file so hook output parsing sees it.

use super::{ProcessAdapter, ProcessAdapterError, ProcessState, Signal, SpawnSpec};
use async_trait::async_trait;
use keep_core::process::{EXIT_SIGKILL, EXIT_SIGTERM};
use keep_core::{Clock, FakeClock};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

/// How a fake process behaves once spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBehavior {
    /// `None` keeps the process running until signalled.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub ignore_term: bool,
    pub missing: bool,
}

impl FakeBehavior {
    pub fn exits(code: i32) -> Self {
        Self { exit_code: Some(code), stdout: String::new(), ignore_term: false, missing: false }
    }

    pub fn runs() -> Self {
        Self { exit_code: None, ..Self::exits(0) }
    }

    /// Spawn fails as if the executable did not exist.
    pub fn missing() -> Self {
        Self { missing: true, ..Self::exits(0) }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Survive SIGTERM; only SIGKILL stops it.
    pub fn ignoring_term(mut self) -> Self {
        self.ignore_term = true;
        self
    }
}

/// A signal delivered to a fake pid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalCall {
    pub pid: u32,
    pub signal: Signal,
}

#[derive(Debug, Clone)]
struct FakeProcess {
    ppid: Option<u32>,
    start_time_ms: u64,
    state: ProcessState,
    ignore_term: bool,
}

struct FakeState {
    next_pid: u32,
    rules: Vec<(String, FakeBehavior)>,
    processes: BTreeMap<u32, FakeProcess>,
    spawned: Vec<(u32, SpawnSpec)>,
    signals: Vec<SignalCall>,
}

/// Fake process adapter for testing
#[derive(Clone)]
pub struct FakeProcessAdapter {
    inner: Arc<Mutex<FakeState>>,
    clock: FakeClock,
}

impl Default for FakeProcessAdapter {
    fn default() -> Self {
        Self::with_clock(FakeClock::new())
    }
}

impl FakeProcessAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start times of spawned processes are read from `clock`.
    pub fn with_clock(clock: FakeClock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                next_pid: 1000,
                rules: Vec::new(),
                processes: BTreeMap::new(),
                spawned: Vec::new(),
                signals: Vec::new(),
            })),
            clock,
        }
    }

    /// Spawns with an argument containing `needle` follow `behavior`.
    /// Unmatched spawns exit 0 immediately.
    pub fn on(&self, needle: impl Into<String>, behavior: FakeBehavior) -> &Self {
        self.inner.lock().rules.push((needle.into(), behavior));
        self
    }

    /// Register a live process that this adapter did not spawn.
    pub fn insert_foreign(&self, pid: u32, ppid: Option<u32>, start_time_ms: u64) {
        self.inner.lock().processes.insert(
            pid,
            FakeProcess { ppid, start_time_ms, state: ProcessState::Running, ignore_term: false },
        );
    }

    /// Add a running OS child under `ppid`. Returns its pid.
    pub fn add_child(&self, ppid: u32) -> u32 {
        let mut inner = self.inner.lock();
        let pid = inner.next_pid;
        inner.next_pid += 1;
        let start_time_ms = self.clock.epoch_ms();
        inner.processes.insert(
            pid,
            FakeProcess { ppid: Some(ppid), start_time_ms, state: ProcessState::Running, ignore_term: false },
        );
        pid
    }

    /// Make a running process exit with `code`.
    pub fn exit(&self, pid: u32, code: i32) {
        if let Some(p) = self.inner.lock().processes.get_mut(&pid) {
            p.state = ProcessState::Exited(code);
        }
    }

    /// Make a process vanish without a reapable status.
    pub fn vanish(&self, pid: u32) {
        if let Some(p) = self.inner.lock().processes.get_mut(&pid) {
            p.state = ProcessState::Gone;
        }
    }

    pub fn spawned(&self) -> Vec<SpawnSpec> {
        self.inner.lock().spawned.iter().map(|(_, spec)| spec.clone()).collect()
    }

    /// Pid assigned to the first spawn with an argument containing `needle`.
    pub fn pid_of(&self, needle: &str) -> Option<u32> {
        self.inner
            .lock()
            .spawned
            .iter()
            .find(|(_, spec)| spec.cmd.iter().any(|arg| arg.contains(needle)))
            .map(|(pid, _)| *pid)
    }

    pub fn signals(&self) -> Vec<SignalCall> {
        self.inner.lock().signals.clone()
    }

    pub fn signals_for(&self, pid: u32) -> Vec<Signal> {
        self.inner.lock().signals.iter().filter(|c| c.pid == pid).map(|c| c.signal).collect()
    }

    pub fn running_pids(&self) -> Vec<u32> {
        self.inner.lock().processes.iter().filter(|(_, p)| p.state.is_running()).map(|(pid, _)| *pid).collect()
    }
}

#[async_trait]
impl ProcessAdapter for FakeProcessAdapter {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<u32, ProcessAdapterError> {
        if spec.cmd.is_empty() {
            return Err(ProcessAdapterError::EmptyCommand);
        }
        let behavior = {
            let inner = self.inner.lock();
            inner
                .rules
                .iter()
                .find(|(needle, _)| spec.cmd.iter().any(|arg| arg.contains(needle.as_str())))
                .map(|(_, b)| b.clone())
                .unwrap_or_else(|| FakeBehavior::exits(0))
        };
        if behavior.missing {
            return Err(ProcessAdapterError::NotFound { program: spec.program().to_string() });
        }
        std::fs::create_dir_all(&spec.cwd)
            .map_err(|source| ProcessAdapterError::WorkingDir { path: spec.cwd.clone(), source })?;
        if !behavior.stdout.is_empty() {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&spec.stdout)
                .map_err(|source| ProcessAdapterError::LogFile { path: spec.stdout.clone(), source })?;
            file.write_all(behavior.stdout.as_bytes())
                .map_err(|source| ProcessAdapterError::LogFile { path: spec.stdout.clone(), source })?;
        }

        let mut inner = self.inner.lock();
        let pid = inner.next_pid;
        inner.next_pid += 1;
        let state = match behavior.exit_code {
            Some(code) => ProcessState::Exited(code),
            None => ProcessState::Running,
        };
        inner.processes.insert(
            pid,
            FakeProcess {
                ppid: None,
                start_time_ms: self.clock.epoch_ms(),
                state,
                ignore_term: behavior.ignore_term,
            },
        );
        inner.spawned.push((pid, spec.clone()));
        Ok(pid)
    }

    fn state(&self, pid: u32) -> ProcessState {
        self.inner.lock().processes.get(&pid).map(|p| p.state).unwrap_or(ProcessState::Gone)
    }

    fn start_time_ms(&self, pid: u32) -> Option<u64> {
        let inner = self.inner.lock();
        inner.processes.get(&pid).filter(|p| p.state.is_running()).map(|p| p.start_time_ms)
    }

    fn children(&self, pid: u32) -> Vec<u32> {
        let inner = self.inner.lock();
        inner
            .processes
            .iter()
            .filter(|(_, p)| p.ppid == Some(pid) && p.state.is_running())
            .map(|(child, _)| *child)
            .collect()
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<bool, ProcessAdapterError> {
        let mut inner = self.inner.lock();
        let Some(process) = inner.processes.get_mut(&pid).filter(|p| p.state.is_running()) else {
            return Ok(false);
        };
        match signal {
            Signal::Term if !process.ignore_term => process.state = ProcessState::Exited(EXIT_SIGTERM),
            Signal::Term => {}
            Signal::Kill => process.state = ProcessState::Exited(EXIT_SIGKILL),
        }
        inner.signals.push(SignalCall { pid, signal });
        Ok(true)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
