// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary installs: run `Binary` hooks until one reports an install.

use super::claim_binary;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::hooks::{discover_hooks, run_hook, HookArgs, HookOutput, BINARY_HOOK_TIMEOUT};
use keep_adapters::ProcessAdapter;
use keep_core::job::BINARY_RETRY_DELAY;
use keep_core::{Binary, Clock, HookEvent, JobKind, ProcessId};
use tokio_util::sync::CancellationToken;

/// Try each install hook in order. Returns whether the binary got installed;
/// if not it stays queued and is retried after [`BINARY_RETRY_DELAY`].
pub async fn install_binary<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    binary: &Binary,
    worker: Option<&ProcessId>,
    cancel: &CancellationToken,
) -> Result<bool, EngineError> {
    let hooks = discover_hooks(&ctx.paths.plugin_dirs, HookEvent::Binary, &ctx.config);
    let overrides = if binary.overrides.is_null() { String::new() } else { binary.overrides.to_string() };
    let args = HookArgs::new()
        .arg("binary-id", &binary.id)
        .arg("machine-id", &binary.machine_id)
        .arg("name", &binary.name)
        .arg("binproviders", &binary.binproviders)
        .arg("overrides", overrides);
    let supervisor = ctx.supervisor();

    for hook in &hooks {
        if cancel.is_cancelled() {
            return Err(EngineError::Interrupted);
        }
        let pwd = ctx.paths.binary_dir(&binary.name).join(&hook.plugin);
        let mut record = run_hook(ctx, hook, &args, &pwd, &ctx.config, worker, Some(BINARY_HOOK_TIMEOUT)).await?;
        let code = match record.exit_code {
            Some(code) => code,
            None => supervisor.run_to_completion(&mut record, cancel).await?,
        };
        let output = HookOutput::read(&record);
        let installed = output.binaries.iter().filter(|b| b.name == binary.name).find_map(|b| b.installed());
        match installed {
            Some(installed) if code == 0 => {
                ctx.store.mark_binary_installed(&binary.id, &installed, ctx.now())?;
                tracing::info!(
                    binary = %binary.name,
                    abspath = %installed.abspath,
                    provider = ?installed.binprovider,
                    hook = %hook.name,
                    "binary installed"
                );
                return Ok(true);
            }
            _ => tracing::debug!(binary = %binary.name, hook = %hook.name, code, "install hook did not install"),
        }
    }

    let retry_at = ctx.clock.after(BINARY_RETRY_DELAY);
    ctx.store.set_retry_at(JobKind::Binary, &binary.id, retry_at, ctx.now())?;
    tracing::warn!(binary = %binary.name, hooks = hooks.len(), "no install hook succeeded, will retry");
    Ok(false)
}

/// Claim and install every binary on this machine that is due, one at a
/// time. Returns how many got installed.
pub async fn install_ready<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    worker: Option<&ProcessId>,
    cancel: &CancellationToken,
) -> Result<usize, EngineError> {
    let mut installed = 0;
    loop {
        let ready = ctx.store.binaries_ready(&ctx.machine, ctx.now())?;
        if ready.is_empty() {
            return Ok(installed);
        }
        let mut progressed = false;
        for binary in ready {
            if !claim_binary(&ctx.store, &binary, ctx.now())? {
                continue;
            }
            progressed = true;
            if install_binary(ctx, &binary, worker, cancel).await? {
                installed += 1;
            }
        }
        if !progressed {
            return Ok(installed);
        }
    }
}

#[cfg(test)]
#[path = "binary_tests.rs"]
mod tests;
