// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keep-core: domain types for the keep archiving orchestrator

pub mod macros;

pub mod clock;
pub mod config;
pub mod hook;
pub mod id;
pub mod job;
pub mod process;
pub mod record;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, ConfigMap, PluginConfig};
pub use hook::{Hook, HookEvent};
pub use id::{short, BinaryId, CrawlId, MachineId, ProcessId, ResultId, SnapshotId};
#[cfg(any(test, feature = "test-support"))]
pub use job::{CrawlBuilder, SnapshotBuilder};
pub use job::{
    ArchiveResult, Binary, BinaryStatus, Crawl, InstalledBinary, Job, JobKind, JobStatus, ResultStatus, Snapshot,
    TransitionNotAllowed,
};
#[cfg(any(test, feature = "test-support"))]
pub use process::ProcessRecordBuilder;
pub use process::{ProcessKind, ProcessRecord, ProcessStatus, WorkerKind};
pub use record::{HookRecord, RecordError};
