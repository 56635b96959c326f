// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process adapter: spawn, signal and inspect OS processes.
//!
//! The engine never touches `nix` or `/proc` directly. Everything it needs
//! from the operating system goes through [`ProcessAdapter`] so workers and
//! the orchestrator can be exercised against [`FakeProcessAdapter`].

pub mod procfs;
mod system;

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake;

use async_trait::async_trait;
use keep_core::ProcessRecord;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub use system::SystemProcessAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBehavior, FakeProcessAdapter, SignalCall};

/// Errors from process operations
#[derive(Debug, Error)]
pub enum ProcessAdapterError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("executable not found: {program}")]
    NotFound { program: String },

    #[error("cannot prepare working directory {}: {source}", path.display())]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to send {signal} to pid {pid}: {errno}")]
    Signal { pid: u32, signal: Signal, errno: nix::errno::Errno },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Term,
    Kill,
}

impl Signal {
    pub fn number(self) -> i32 {
        match self {
            Signal::Term => 15,
            Signal::Kill => 9,
        }
    }

    pub(crate) fn to_nix(self) -> nix::sys::signal::Signal {
        match self {
            Signal::Term => nix::sys::signal::Signal::SIGTERM,
            Signal::Kill => nix::sys::signal::Signal::SIGKILL,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Term => "SIGTERM",
            Signal::Kill => "SIGKILL",
        })
    }
}

/// Liveness of a pid as seen by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Reaped by us with a known exit code.
    Exited(i32),
    /// No longer alive and the exit code is unknowable (not our child).
    Gone,
}

impl ProcessState {
    pub fn is_running(self) -> bool {
        self == ProcessState::Running
    }
}

/// A fully resolved launch: argv, working directory, extra environment and
/// the files stdout and stderr are appended to.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnSpec {
    pub cmd: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl SpawnSpec {
    pub fn for_record(record: &ProcessRecord) -> Self {
        Self {
            cmd: record.cmd.clone(),
            cwd: record.pwd.clone(),
            env: record.env.clone(),
            stdout: record.stdout_path(),
            stderr: record.stderr_path(),
        }
    }

    pub fn program(&self) -> &str {
        self.cmd.first().map(String::as_str).unwrap_or_default()
    }
}

/// Adapter for OS process management
#[async_trait]
pub trait ProcessAdapter: Clone + Send + Sync + 'static {
    /// Start the process without waiting for it. Returns its pid.
    async fn spawn(&self, spec: &SpawnSpec) -> Result<u32, ProcessAdapterError>;

    /// Non-blocking liveness check. Reaps our own children when they exit.
    fn state(&self, pid: u32) -> ProcessState;

    /// Wall-clock start of `pid` in epoch ms, if it is alive and inspectable.
    fn start_time_ms(&self, pid: u32) -> Option<u64>;

    /// Direct children of `pid` from the OS process table.
    fn children(&self, pid: u32) -> Vec<u32>;

    /// Send `signal`. Returns `false` if no such process exists.
    fn signal(&self, pid: u32, signal: Signal) -> Result<bool, ProcessAdapterError>;

    fn is_alive(&self, pid: u32) -> bool {
        self.state(pid).is_running()
    }

    /// Every OS descendant of `pid`, breadth-first (shallowest first).
    fn descendants(&self, pid: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([pid]);
        let mut frontier = VecDeque::from([pid]);
        while let Some(next) = frontier.pop_front() {
            for child in self.children(next) {
                if seen.insert(child) {
                    frontier.push_back(child);
                    out.push(child);
                }
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
