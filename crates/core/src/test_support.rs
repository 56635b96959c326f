// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::id::MachineId;
use crate::process::{ProcessKind, ProcessRecord, ProcessStatus, WorkerKind};
use std::path::PathBuf;

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::job::{JobStatus, ResultStatus};
    use proptest::prelude::*;

    pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
        proptest::sample::select(JobStatus::ALL.to_vec())
    }

    pub fn arb_result_status() -> impl Strategy<Value = ResultStatus> {
        proptest::sample::select(ResultStatus::ALL.to_vec())
    }

    /// Hook file names following the `on_<Event>__NN_<name>.<ext>` convention.
    pub fn arb_hook_name() -> impl Strategy<Value = String> {
        (
            prop_oneof![Just("Crawl"), Just("Snapshot"), Just("Binary")],
            0u8..100,
            "[a-z]{1,8}",
            any::<bool>(),
            prop_oneof![Just("sh"), Just("py"), Just("js")],
        )
            .prop_map(|(event, ord, name, bg, ext)| {
                let bg = if bg { ".bg" } else { "" };
                format!("on_{event}__{ord:02}_{name}{bg}.{ext}")
            })
    }
}

// ── Record factories ─────────────────────────────────────────────────────

pub fn machine() -> MachineId {
    MachineId::from_string("mch-test")
}

/// A running worker record whose command line targets `flag`=`id`.
pub fn running_worker(kind: WorkerKind, flag: &str, id: &str, pid: u32, started_at_ms: u64) -> ProcessRecord {
    ProcessRecord::builder()
        .kind(ProcessKind::Worker)
        .worker_kind(Some(kind))
        .cmd(vec!["keep".into(), "run".into(), flag.into(), id.into()])
        .status(ProcessStatus::Running)
        .pid(Some(pid))
        .started_at_ms(Some(started_at_ms))
        .created_at_ms(started_at_ms)
        .modified_at_ms(started_at_ms)
        .build()
}

/// A running hook record under `parent`.
pub fn running_hook(parent: Option<&ProcessRecord>, pid: u32, started_at_ms: u64) -> ProcessRecord {
    ProcessRecord::builder()
        .kind(ProcessKind::Hook)
        .parent_id(parent.map(|p| p.id.clone()))
        .pwd(PathBuf::from(format!("/tmp/keep-test/hook-{pid}")))
        .status(ProcessStatus::Running)
        .pid(Some(pid))
        .started_at_ms(Some(started_at_ms))
        .created_at_ms(started_at_ms)
        .modified_at_ms(started_at_ms)
        .build()
}
