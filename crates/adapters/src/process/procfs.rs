// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal `/proc` readers: start time, parent pid and zombie state.
//!
//! On platforms without procfs every reader returns `None` or empty, which
//! callers treat as "cannot verify".

use nix::unistd::{sysconf, SysconfVar};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

const PROC_ROOT: &str = "/proc";

static BOOT_TIME_SECS: LazyLock<Option<u64>> =
    LazyLock::new(|| fs::read_to_string(Path::new(PROC_ROOT).join("stat")).ok().as_deref().and_then(parse_btime));

static CLOCK_TICKS: LazyLock<u64> = LazyLock::new(|| match sysconf(SysconfVar::CLK_TCK) {
    Ok(Some(hz)) if hz > 0 => hz as u64,
    _ => 100,
});

/// Fields of `/proc/<pid>/stat` the supervisor cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: u32,
    pub state: char,
    pub ppid: u32,
    /// Clock ticks since boot.
    pub start_ticks: u64,
}

impl ProcStat {
    pub fn is_zombie(&self) -> bool {
        matches!(self.state, 'Z' | 'X')
    }
}

/// Parse a stat line. The command name may contain spaces and parentheses,
/// so fields are counted from the last `)`.
pub fn parse_stat(text: &str) -> Option<ProcStat> {
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    let pid = text.get(..open)?.trim().parse().ok()?;
    let fields: Vec<&str> = text.get(close + 1..)?.split_whitespace().collect();
    Some(ProcStat {
        pid,
        state: fields.first()?.chars().next()?,
        ppid: fields.get(1)?.parse().ok()?,
        start_ticks: fields.get(19)?.parse().ok()?,
    })
}

/// `btime` (boot time, epoch seconds) from `/proc/stat`.
pub fn parse_btime(text: &str) -> Option<u64> {
    text.lines()
        .find_map(|line| line.strip_prefix("btime"))
        .and_then(|rest| rest.trim().parse().ok())
}

pub fn ticks_to_epoch_ms(boot_secs: u64, ticks: u64, hz: u64) -> u64 {
    boot_secs.saturating_mul(1000).saturating_add(ticks.saturating_mul(1000) / hz.max(1))
}

pub fn read_stat(pid: u32) -> Option<ProcStat> {
    let text = fs::read_to_string(Path::new(PROC_ROOT).join(pid.to_string()).join("stat")).ok()?;
    parse_stat(&text)
}

pub fn start_time_ms(pid: u32) -> Option<u64> {
    let stat = read_stat(pid)?;
    let boot = (*BOOT_TIME_SECS)?;
    Some(ticks_to_epoch_ms(boot, stat.start_ticks, *CLOCK_TICKS))
}

pub fn is_zombie(pid: u32) -> bool {
    read_stat(pid).is_some_and(|s| s.is_zombie())
}

/// Pids whose parent is `ppid`, ascending.
pub fn child_pids(ppid: u32) -> Vec<u32> {
    let Ok(entries) = fs::read_dir(PROC_ROOT) else {
        return Vec::new();
    };
    let mut pids: Vec<u32> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().and_then(|name| name.parse::<u32>().ok()))
        .filter(|&pid| read_stat(pid).is_some_and(|s| s.ppid == ppid))
        .collect();
    pids.sort_unstable();
    pids
}

#[cfg(test)]
#[path = "procfs_tests.rs"]
mod tests;
