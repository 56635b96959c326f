// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary worker: one named install, or the machine's whole queue.

use super::{claimed_by_parent, pause};
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::machine::binary::{install_binary, install_ready};
use crate::machine::claim_binary;
use keep_adapters::ProcessAdapter;
use keep_core::{BinaryId, Clock, ProcessRecord};
use tokio_util::sync::CancellationToken;

pub(super) async fn run_one<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    id: &BinaryId,
    me: &ProcessRecord,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let binary = ctx.store.require_binary(id)?;
    if binary.is_installed() {
        tracing::info!(binary = %binary.name, "already installed");
        return Ok(());
    }
    if !claimed_by_parent(ctx) && !claim_binary(&ctx.store, &binary, ctx.now())? {
        tracing::info!(binary = %binary.name, "binary not claimable, exiting");
        return Ok(());
    }
    install_binary(ctx, &binary, Some(&me.id), cancel).await?;
    Ok(())
}

/// Install queued binaries one at a time until the queue has been empty
/// for `binary_idle_polls` consecutive polls.
pub(super) async fn run_queue<P: ProcessAdapter, C: Clock>(
    ctx: &EngineContext<P, C>,
    me: &ProcessRecord,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let mut idle = 0;
    while idle < ctx.tuning.binary_idle_polls {
        let ready = ctx.store.binaries_ready(&ctx.machine, ctx.now())?;
        if ready.is_empty() {
            idle += 1;
        } else {
            idle = 0;
            let installed = install_ready(ctx, Some(&me.id), cancel).await?;
            tracing::debug!(installed, "binary queue pass done");
        }
        pause(cancel, ctx.tuning.binary_poll_interval).await?;
    }
    tracing::info!(polls = ctx.tuning.binary_idle_polls, "binary queue idle, exiting");
    Ok(())
}

#[cfg(test)]
#[path = "binary_tests.rs"]
mod tests;
