// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `keep status`: queue depth, job states and live processes.

use std::path::PathBuf;

use anyhow::Result;
use keep_core::{Clock, JobKind, MachineId, ProcessRecord, SystemClock};
use keep_daemon::{daemon_pid, Settings};
use keep_storage::{QueueCounts, Store};
use serde::Serialize;

use crate::color;
use crate::output::{format_time_ago, print_json, OutputFormat};

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub data_dir: PathBuf,
    pub daemon_pid: Option<u32>,
    pub queued: QueuedCounts,
    pub jobs: Vec<JobCounts>,
    pub processes: Vec<ProcessRow>,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct QueuedCounts {
    pub crawls: u64,
    pub snapshots: u64,
    pub binaries: u64,
}

impl From<QueueCounts> for QueuedCounts {
    fn from(c: QueueCounts) -> Self {
        Self { crawls: c.crawls, snapshots: c.snapshots, binaries: c.binaries }
    }
}

#[derive(Debug, Serialize)]
pub struct JobCounts {
    pub kind: &'static str,
    pub statuses: Vec<(String, u64)>,
}

#[derive(Debug, Serialize)]
pub struct ProcessRow {
    pub id: String,
    pub kind: &'static str,
    pub worker: Option<&'static str>,
    pub pid: Option<u32>,
    pub started_at_ms: Option<u64>,
    pub cmd: String,
}

impl From<&ProcessRecord> for ProcessRow {
    fn from(p: &ProcessRecord) -> Self {
        Self {
            id: p.id.to_string(),
            kind: p.kind.as_str(),
            worker: p.worker_kind.map(|k| k.as_str()),
            pid: p.pid,
            started_at_ms: p.started_at_ms,
            cmd: p.cmd_line(),
        }
    }
}

pub fn handle(format: OutputFormat) -> Result<()> {
    let settings = Settings::load()?;
    let store = settings.open_store()?;
    let now = SystemClock.epoch_ms();
    let mut report = collect(&store, &settings.machine, now)?;
    report.data_dir = settings.data_dir().to_path_buf();
    report.daemon_pid = daemon_pid(&settings.lock_path());

    match format {
        OutputFormat::Text => print!("{}", render(&report, now)),
        OutputFormat::Json => print_json(&report)?,
    }
    Ok(())
}

/// Gather counts and running processes for this machine.
pub fn collect(store: &Store, machine: &MachineId, now_ms: u64) -> Result<StatusReport> {
    let queued = store.queue_counts(machine, now_ms, None)?.into();
    let mut jobs = Vec::new();
    for kind in [JobKind::Crawl, JobKind::Snapshot, JobKind::Binary] {
        jobs.push(JobCounts { kind: kind.as_str(), statuses: store.status_counts(kind)? });
    }
    let processes = store
        .get_running(None, None)?
        .iter()
        .filter(|p| &p.machine_id == machine)
        .map(ProcessRow::from)
        .collect();
    Ok(StatusReport { data_dir: PathBuf::new(), daemon_pid: None, queued, jobs, processes })
}

pub fn render(report: &StatusReport, now_ms: u64) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {}\n", color::header("data:"), report.data_dir.display()));
    match report.daemon_pid {
        Some(pid) => out.push_str(&format!("{} running (pid {pid})\n", color::header("keepd:"))),
        None => out.push_str(&format!("{} {}\n", color::header("keepd:"), color::muted("not running"))),
    }

    let q = &report.queued;
    out.push_str(&format!(
        "\n{} {} crawls, {} snapshots, {} binaries\n",
        color::header("ready:"),
        q.crawls,
        q.snapshots,
        q.binaries
    ));
    for job in &report.jobs {
        let counts: Vec<String> = job.statuses.iter().map(|(s, n)| format!("{s}={n}")).collect();
        let counts = if counts.is_empty() { color::muted("none") } else { counts.join(" ") };
        out.push_str(&format!("  {:<9} {counts}\n", job.kind));
    }

    out.push_str(&format!("\n{}\n", color::header("processes:")));
    if report.processes.is_empty() {
        out.push_str(&format!("  {}\n", color::muted("none")));
    }
    for p in &report.processes {
        let kind = match p.worker {
            Some(worker) => format!("{}/{worker}", p.kind),
            None => p.kind.to_string(),
        };
        let pid = p.pid.map(|pid| pid.to_string()).unwrap_or_else(|| "-".to_string());
        let age = format_time_ago(p.started_at_ms.unwrap_or(0), now_ms);
        out.push_str(&format!("  {} {kind:<15} {pid:>7} {age:>4}  {}\n", color::muted(&p.id), p.cmd));
    }
    out
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
