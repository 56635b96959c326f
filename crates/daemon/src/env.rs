// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for keep processes.

use std::path::PathBuf;
use std::time::Duration;

use keep_core::ProcessId;

/// Data directory override.
pub const DATA_DIR: &str = "KEEP_DATA_DIR";
/// Built-in plugin directory, searched before `<data_dir>/plugins`.
pub const PLUGINS_DIR: &str = "KEEP_PLUGINS_DIR";
/// Executable used to spawn worker processes.
pub const BIN: &str = "KEEP_BIN";

/// Marker files that make the current directory a data directory.
const DATA_DIR_MARKERS: &[&str] = &["keep.toml", "index.sqlite3"];

/// Resolve the data directory: `KEEP_DATA_DIR` > current directory if it
/// already holds a collection > `<local data dir>/keep`.
pub fn data_dir() -> Option<PathBuf> {
    if let Some(dir) = var(DATA_DIR) {
        return Some(PathBuf::from(dir));
    }
    if let Ok(cwd) = std::env::current_dir() {
        if DATA_DIR_MARKERS.iter().any(|m| cwd.join(m).exists()) {
            return Some(cwd);
        }
    }
    dirs::data_local_dir().map(|d| d.join("keep"))
}

pub fn plugins_dir() -> Option<PathBuf> {
    var(PLUGINS_DIR).map(PathBuf::from)
}

/// The `keep` executable: `KEEP_BIN`, this executable if it is `keep`,
/// or a `keep` next to it.
pub fn keep_bin() -> PathBuf {
    if let Some(bin) = var(BIN) {
        return PathBuf::from(bin);
    }
    let Ok(exe) = std::env::current_exe() else {
        return PathBuf::from("keep");
    };
    if exe.file_stem().is_some_and(|s| s == "keep") {
        return exe;
    }
    exe.parent().map(|dir| dir.join("keep")).filter(|p| p.exists()).unwrap_or_else(|| PathBuf::from("keep"))
}

/// Orchestrator poll interval override
pub fn poll_interval() -> Option<Duration> {
    parse::<u64>("KEEP_POLL_INTERVAL_MS").map(Duration::from_millis)
}

pub fn pid_reuse_window() -> Option<Duration> {
    parse::<u64>("KEEP_PID_REUSE_WINDOW_SECS").map(Duration::from_secs)
}

pub fn start_time_tolerance() -> Option<Duration> {
    parse::<u64>("KEEP_START_TIME_TOLERANCE_MS").map(Duration::from_millis)
}

pub fn max_crawl_workers() -> Option<usize> {
    parse("KEEP_MAX_CRAWL_WORKERS")
}

pub fn max_snapshot_workers() -> Option<usize> {
    parse("KEEP_MAX_SNAPSHOT_WORKERS")
}

/// Record id a parent created for this process.
pub fn process_id() -> Option<ProcessId> {
    var(keep_engine::PROCESS_ID_ENV).map(ProcessId::from_string)
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
