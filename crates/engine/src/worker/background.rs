// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background hooks a snapshot worker launched but does not wait on.

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::machine::snapshot::{finish_hook, PendingHook};
use keep_adapters::ProcessAdapter;
use keep_core::{Clock, Crawl, ProcessRecord, Snapshot};
use std::collections::BTreeMap;

/// Running background hooks keyed by hook name.
#[derive(Debug, Default)]
pub struct BackgroundHooks {
    running: BTreeMap<String, (PendingHook, ProcessRecord)>,
}

impl BackgroundHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pending: PendingHook, process: ProcessRecord) {
        self.running.insert(pending.hook.name.clone(), (pending, process));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    #[cfg(test)]
    pub fn processes(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.running.values().map(|(_, p)| p)
    }

    /// Finish every hook that has exited on its own. Returns how many.
    pub fn reap<P: ProcessAdapter, C: Clock>(
        &mut self,
        ctx: &EngineContext<P, C>,
        crawl: &Crawl,
        snapshot: &Snapshot,
    ) -> Result<usize, EngineError> {
        let supervisor = ctx.supervisor();
        let mut exited = Vec::new();
        for (name, (_, process)) in self.running.iter_mut() {
            if supervisor.poll(process)?.is_some() {
                exited.push(name.clone());
            }
        }
        for name in &exited {
            if let Some((mut pending, mut process)) = self.running.remove(name) {
                finish_hook(ctx, crawl, snapshot, &mut pending, &mut process)?;
            }
        }
        Ok(exited.len())
    }

    /// Tree-kill every remaining hook, each within what is left of its own
    /// timeout, then record their results.
    pub async fn terminate_all<P: ProcessAdapter, C: Clock>(
        &mut self,
        ctx: &EngineContext<P, C>,
        crawl: &Crawl,
        snapshot: &Snapshot,
    ) -> Result<usize, EngineError> {
        if self.running.is_empty() {
            return Ok(0);
        }
        let (mut pending, mut processes): (Vec<PendingHook>, Vec<ProcessRecord>) =
            std::mem::take(&mut self.running).into_values().unzip();
        let now = ctx.now();
        tracing::info!(snapshot = %snapshot.id, count = processes.len(), "terminating background hooks");
        ctx.supervisor().kill_trees(&mut processes, |p| p.remaining(now)).await?;

        for (pending, process) in pending.iter_mut().zip(processes.iter_mut()) {
            finish_hook(ctx, crawl, snapshot, pending, process)?;
        }
        Ok(processes.len())
    }
}

#[cfg(test)]
#[path = "background_tests.rs"]
mod tests;
