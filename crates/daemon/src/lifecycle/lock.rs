// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive pid lock held by `keepd` for its whole lifetime.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::warn;

use super::LifecycleError;

pub struct DaemonLock {
    path: PathBuf,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    file: File,
}

impl DaemonLock {
    /// Take the lock and write our pid into it.
    pub fn acquire(path: &Path) -> Result<Self, LifecycleError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Open without truncating so a running daemon's pid survives a
        // failed attempt.
        let mut file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(path)?;
        file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { path: path.to_path_buf(), file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the pid file. The lock itself is released on drop.
    pub fn release(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}

/// Pid of the daemon holding the lock at `path`, if one does.
pub fn daemon_pid(path: &Path) -> Option<u32> {
    let file = std::fs::OpenOptions::new().read(true).write(true).open(path).ok()?;
    if file.try_lock_exclusive().is_ok() {
        let _ = FileExt::unlock(&file);
        return None;
    }
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
