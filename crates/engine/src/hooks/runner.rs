// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Launching one hook as a child of the current worker.

use crate::context::EngineContext;
use crate::error::EngineError;
use keep_adapters::ProcessAdapter;
use keep_core::{Clock, ConfigMap, Hook, ProcessId, ProcessKind, ProcessRecord};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Budget for `Binary` install hooks, regardless of plugin config.
pub const BINARY_HOOK_TIMEOUT: Duration = Duration::from_secs(600);

/// Exit code recorded for a hook whose script does not exist.
const MISSING_SCRIPT_EXIT: i32 = 1;

/// `--key=value` arguments passed to a hook. Empty values are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookArgs(Vec<(String, String)>);

impl HookArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, key: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        if !value.is_empty() {
            self.0.push((key.to_string(), value));
        }
        self
    }

    pub fn to_args(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("--{k}={v}")).collect()
    }
}

/// Start `hook` in `pwd` without waiting for it.
///
/// The returned record is running, or already exited when the script is
/// missing or could not be launched; those outcomes are left for the
/// caller's status resolution rather than raised. Foreground callers wait
/// with [`Supervisor::run_to_completion`](crate::supervisor::Supervisor::run_to_completion).
pub async fn run_hook<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    hook: &Hook,
    args: &HookArgs,
    pwd: &Path,
    config: &ConfigMap,
    parent: Option<&ProcessId>,
    timeout: Option<Duration>,
) -> Result<ProcessRecord, EngineError> {
    let timeout = timeout.unwrap_or_else(|| config.plugin(&hook.plugin).timeout);
    let mut cmd = hook.command();
    cmd.extend(args.to_args());
    let mut record = ProcessRecord::new(ProcessKind::Hook, cmd, pwd, ctx.machine.clone(), ctx.now())
        .with_parent(parent.cloned())
        .with_timeout(timeout);

    if !hook.path.is_file() {
        tracing::warn!(hook = %hook.name, path = %hook.path.display(), "hook script missing");
        record.stderr = format!("hook script not found: {}", hook.path.display());
        record.mark_exited(MISSING_SCRIPT_EXIT, ctx.now());
        ctx.store.insert_process(&record)?;
        return Ok(record);
    }

    let mut env: BTreeMap<String, String> = config.to_env().into_iter().collect();
    env.extend(ctx.base_env());
    env.insert("KEEP_PROCESS_ID".to_string(), record.id.to_string());
    record.env = env;

    match ctx.supervisor().launch(&mut record, true).await {
        Ok(pid) => {
            tracing::info!(hook = %hook.name, pid, background = hook.background, "hook started");
            Ok(record)
        }
        Err(EngineError::Launch { .. }) => Ok(record),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
