// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine unit tests.

use crate::context::{EngineContext, Paths};
use crate::supervisor::Supervisor;
use keep_adapters::FakeProcessAdapter;
use keep_core::test_support::machine;
use keep_core::{Crawl, FakeClock, ProcessKind, ProcessRecord};
use keep_storage::Store;
use std::path::PathBuf;
use tempfile::TempDir;

pub(crate) type TestContext = EngineContext<FakeProcessAdapter, FakeClock>;

/// In-memory store, fake processes, fake clock and a scratch data dir.
pub(crate) struct TestEnv {
    pub dir: TempDir,
    pub ctx: TestContext,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = FakeClock::new();
        let adapter = FakeProcessAdapter::with_clock(clock.clone());
        let store = Store::open_in_memory().unwrap();
        let paths = Paths::under(dir.path().join("data"), &machine()).with_keep_bin("/usr/local/bin/keep");
        let ctx = EngineContext::new(store, adapter, clock, machine(), paths);
        Self { dir, ctx }
    }

    pub fn store(&self) -> &Store {
        &self.ctx.store
    }

    pub fn adapter(&self) -> &FakeProcessAdapter {
        &self.ctx.adapter
    }

    pub fn clock(&self) -> &FakeClock {
        &self.ctx.clock
    }

    pub fn supervisor(&self) -> Supervisor<FakeProcessAdapter, FakeClock> {
        self.ctx.supervisor()
    }

    pub fn now(&self) -> u64 {
        self.ctx.now()
    }

    /// Write an executable hook script under the user plugins dir.
    pub fn write_hook(&self, rel: &str, body: &str) -> PathBuf {
        let path = self.ctx.paths.plugin_dirs[0].join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("#!/usr/bin/env bash\n{body}\n")).unwrap();
        path
    }

    /// Unsaved record with a scratch working dir.
    pub fn record(&self, kind: ProcessKind, cmd: &[&str]) -> ProcessRecord {
        let cmd: Vec<String> = cmd.iter().map(|s| s.to_string()).collect();
        let mut record = ProcessRecord::new(kind, cmd, PathBuf::new(), machine(), self.now());
        record.pwd = self.dir.path().join("procs").join(record.id.as_str());
        record
    }

    /// Launch `cmd` in the background and return its saved record.
    pub async fn running(&self, kind: ProcessKind, cmd: &[&str], parent: Option<&ProcessRecord>) -> ProcessRecord {
        let mut record = self.record(kind, cmd).with_parent(parent.map(|p| p.id.clone()));
        self.supervisor().launch(&mut record, true).await.unwrap();
        record
    }

    pub fn queue_crawl(&self, urls: &str, max_depth: u32) -> Crawl {
        let crawl = Crawl::new(urls, max_depth, self.now());
        self.store().insert_crawl(&crawl).unwrap();
        crawl
    }
}
