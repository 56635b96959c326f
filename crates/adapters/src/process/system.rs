// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real process adapter backed by `tokio::process` and `nix` signals.

use super::{procfs, ProcessAdapter, ProcessAdapterError, ProcessState, Signal, SpawnSpec};
use async_trait::async_trait;
use keep_core::process::{signal_exit_code, EXIT_SIGKILL};
use nix::errno::Errno;
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::process::{Child, Command};

/// Spawns real OS processes.
///
/// Children spawned through this adapter are kept so their exit status can
/// be reaped; any other pid is inspected through signals and `/proc` only.
#[derive(Clone, Default)]
pub struct SystemProcessAdapter {
    children: Arc<Mutex<HashMap<u32, Child>>>,
}

impl SystemProcessAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessAdapter for SystemProcessAdapter {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<u32, ProcessAdapterError> {
        let (program, args) = spec.cmd.split_first().ok_or(ProcessAdapterError::EmptyCommand)?;
        tokio::fs::create_dir_all(&spec.cwd)
            .await
            .map_err(|source| ProcessAdapterError::WorkingDir { path: spec.cwd.clone(), source })?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(open_log(&spec.stdout)?)
            .stderr(open_log(&spec.stderr)?);

        let child = command.spawn().map_err(|source| match source.kind() {
            ErrorKind::NotFound => ProcessAdapterError::NotFound { program: program.clone() },
            _ => ProcessAdapterError::Spawn { program: program.clone(), source },
        })?;
        let pid = child.id().ok_or_else(|| ProcessAdapterError::Spawn {
            program: program.clone(),
            source: std::io::Error::other("process exited before reporting a pid"),
        })?;
        tracing::debug!(pid, program = %program, cwd = %spec.cwd.display(), "spawned process");
        self.children.lock().insert(pid, child);
        Ok(pid)
    }

    fn state(&self, pid: u32) -> ProcessState {
        {
            let mut children = self.children.lock();
            if let Some(child) = children.get_mut(&pid) {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        children.remove(&pid);
                        return ProcessState::Exited(exit_code(status));
                    }
                    Ok(None) => return ProcessState::Running,
                    Err(e) => {
                        tracing::warn!(pid, error = %e, "try_wait failed, falling back to signal probe");
                        children.remove(&pid);
                    }
                }
            }
        }
        if pid_alive(pid) {
            ProcessState::Running
        } else {
            ProcessState::Gone
        }
    }

    fn start_time_ms(&self, pid: u32) -> Option<u64> {
        procfs::start_time_ms(pid)
    }

    fn children(&self, pid: u32) -> Vec<u32> {
        procfs::child_pids(pid)
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<bool, ProcessAdapterError> {
        let Some(target) = to_pid(pid) else {
            return Ok(false);
        };
        match nix::sys::signal::kill(target, signal.to_nix()) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(errno) => Err(ProcessAdapterError::Signal { pid, signal, errno }),
        }
    }
}

fn open_log(path: &Path) -> Result<File, ProcessAdapterError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| ProcessAdapterError::LogFile { path: path.to_path_buf(), source })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ProcessAdapterError::LogFile { path: path.to_path_buf(), source })
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().or_else(|| status.signal().map(signal_exit_code)).unwrap_or(EXIT_SIGKILL)
}

/// Pid 0 and values past `i32::MAX` would address process groups.
fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|&p| p > 0).map(Pid::from_raw)
}

fn pid_alive(pid: u32) -> bool {
    let Some(target) = to_pid(pid) else {
        return false;
    };
    match nix::sys::signal::kill(target, None) {
        Ok(()) => !procfs::is_zombie(pid),
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "system_tests.rs"]
mod tests;
