// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted record of one OS process launched by the system.
//!
//! A record is created `queued` when the launch is decided, becomes
//! `running` once a pid is obtained, and ends `exited` with an exit code.
//! Parent links form the process tree used to scope workers and to find
//! hook subprocesses that must be cleaned up.

use crate::id::{MachineId, ProcessId};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

crate::text_enum! {
    /// Role of a process in the tree.
    pub enum ProcessKind {
        Orchestrator => "orchestrator",
        Worker => "worker",
        Hook => "hook",
        Cli => "cli",
        Binary => "binary",
    }
}

crate::text_enum! {
    pub enum ProcessStatus {
        Queued => "queued",
        Running => "running",
        Exited => "exited",
    }
}

crate::text_enum! {
    /// Job kind a worker process is bound to.
    pub enum WorkerKind {
        Crawl => "crawl",
        Snapshot => "snapshot",
        Binary => "binary",
    }
}

/// Exit code recorded for a process killed by SIGKILL.
pub const EXIT_SIGKILL: i32 = 137;
/// Exit code recorded for a process stopped by SIGTERM.
pub const EXIT_SIGTERM: i32 = 143;

/// Default budget for hook and helper processes.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(120);
/// Budget for worker processes.
pub const WORKER_TIMEOUT: Duration = Duration::from_secs(3600);

/// Shell convention: a process terminated by signal `n` exits with `128 + n`.
pub fn signal_exit_code(signal: i32) -> i32 {
    128 + signal
}

/// Negative codes come from signal deaths the OS reported without a status.
pub fn normalize_exit_code(code: i32) -> i32 {
    if code < 0 {
        EXIT_SIGKILL
    } else {
        code
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    pub id: ProcessId,
    pub machine_id: MachineId,
    pub parent_id: Option<ProcessId>,
    pub kind: ProcessKind,
    pub worker_kind: Option<WorkerKind>,
    pub cmd: Vec<String>,
    pub pwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub started_at_ms: Option<u64>,
    pub ended_at_ms: Option<u64>,
    pub created_at_ms: u64,
    pub modified_at_ms: u64,
}

impl ProcessRecord {
    pub fn new(
        kind: ProcessKind,
        cmd: Vec<String>,
        pwd: impl Into<PathBuf>,
        machine_id: MachineId,
        now_ms: u64,
    ) -> Self {
        Self {
            id: ProcessId::new(),
            machine_id,
            parent_id: None,
            kind,
            worker_kind: None,
            cmd,
            pwd: pwd.into(),
            env: BTreeMap::new(),
            timeout: DEFAULT_PROCESS_TIMEOUT,
            status: ProcessStatus::Queued,
            pid: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            started_at_ms: None,
            ended_at_ms: None,
            created_at_ms: now_ms,
            modified_at_ms: now_ms,
        }
    }

    pub fn with_parent(mut self, parent: Option<ProcessId>) -> Self {
        self.parent_id = parent;
        self
    }

    pub fn with_worker_kind(mut self, kind: WorkerKind) -> Self {
        self.worker_kind = Some(kind);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.status == ProcessStatus::Running
    }

    pub fn is_exited(&self) -> bool {
        self.status == ProcessStatus::Exited
    }

    pub fn mark_running(&mut self, pid: u32, started_at_ms: u64) {
        self.status = ProcessStatus::Running;
        self.pid = Some(pid);
        self.started_at_ms = Some(started_at_ms);
        self.modified_at_ms = started_at_ms;
    }

    /// Record the exit. Already-exited records are left as they are.
    pub fn mark_exited(&mut self, exit_code: i32, now_ms: u64) {
        if self.is_exited() {
            return;
        }
        self.status = ProcessStatus::Exited;
        self.exit_code = Some(normalize_exit_code(exit_code));
        self.ended_at_ms = Some(now_ms);
        self.modified_at_ms = now_ms;
    }

    /// Epoch ms at which the process exceeds its budget.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.started_at_ms
            .map(|start| start.saturating_add(self.timeout.as_millis() as u64))
    }

    /// Budget left at `now_ms`, measured from this process's own start.
    pub fn remaining(&self, now_ms: u64) -> Duration {
        match self.deadline_ms() {
            Some(deadline) => Duration::from_millis(deadline.saturating_sub(now_ms)),
            None => self.timeout,
        }
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.pwd.join("stdout.log")
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.pwd.join("stderr.log")
    }

    pub fn cmd_path(&self) -> PathBuf {
        self.pwd.join("cmd.sh")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.pwd.join(format!("{}.pid", self.kind))
    }

    /// Value of `--flag value` or `--flag=value` on the command line.
    pub fn cmd_flag_value(&self, flag: &str) -> Option<&str> {
        cmd_flag_value(&self.cmd, flag)
    }

    /// Shell-quoted command line, as written to `cmd.sh`.
    pub fn cmd_line(&self) -> String {
        self.cmd.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ")
    }
}

pub fn cmd_flag_value<'a>(cmd: &'a [String], flag: &str) -> Option<&'a str> {
    let mut args = cmd.iter();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next().map(String::as_str);
        }
        if let Some(value) = arg.strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
            return Some(value);
        }
    }
    None
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

crate::builder! {
    pub struct ProcessRecordBuilder => ProcessRecord {
        into {
            id: ProcessId = ProcessId::new(),
            machine_id: MachineId = "mch-test",
            pwd: PathBuf = "/tmp/keep-test",
        }
        set {
            parent_id: Option<ProcessId> = None,
            kind: ProcessKind = ProcessKind::Hook,
            worker_kind: Option<WorkerKind> = None,
            cmd: Vec<String> = vec!["true".to_string()],
            env: BTreeMap<String, String> = BTreeMap::new(),
            timeout: Duration = DEFAULT_PROCESS_TIMEOUT,
            status: ProcessStatus = ProcessStatus::Queued,
            pid: Option<u32> = None,
            exit_code: Option<i32> = None,
            stdout: String = String::new(),
            stderr: String = String::new(),
            started_at_ms: Option<u64> = None,
            ended_at_ms: Option<u64> = None,
            created_at_ms: u64 = 0,
            modified_at_ms: u64 = 0,
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
