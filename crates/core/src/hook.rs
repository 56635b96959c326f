// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook naming convention.
//!
//! Hooks are scripts named `on_<Event>__<NN>_<name>.<ext>`, either inside a
//! plugin directory (`wget/on_Snapshot__50_wget.py`) or at the top level of a
//! plugins root. A `.bg.` segment marks a background hook.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

crate::text_enum! {
    /// Job kind a hook is bound to.
    pub enum HookEvent {
        Crawl => "Crawl",
        CrawlEnd => "CrawlEnd",
        Snapshot => "Snapshot",
        Binary => "Binary",
    }
}

/// Ordinal given to hooks whose name carries none.
pub const DEFAULT_ORDINAL: u8 = 99;

/// File extensions recognised as hooks.
pub const HOOK_EXTENSIONS: &[&str] = &["sh", "py", "js"];

#[allow(clippy::expect_used)]
static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__(\d{2})_").expect("constant regex pattern is valid"));

#[allow(clippy::expect_used)]
static LEADING_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}_").expect("constant regex pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub path: PathBuf,
    pub event: HookEvent,
    /// File name, used as the hook's identity within a job.
    pub name: String,
    pub plugin: String,
    pub ordinal: u8,
    pub background: bool,
}

impl Hook {
    /// Parse a hook found under the plugins root `root`. `None` if the file
    /// name does not follow the convention for `event`.
    ///
    /// Hooks inside a plugin directory take that directory's name as their
    /// plugin; hooks directly under `root` derive it from the file name.
    pub fn from_path(root: &Path, path: &Path, event: HookEvent) -> Option<Hook> {
        let name = path.file_name()?.to_str()?.to_string();
        if !name.starts_with(&format!("on_{}__", event.as_str())) {
            return None;
        }
        let ext = path.extension()?.to_str()?;
        if !HOOK_EXTENSIONS.contains(&ext) {
            return None;
        }
        let parent = path.parent()?;
        let plugin = if parent == root {
            plugin_from_file_name(&name)
        } else {
            parent.file_name()?.to_str()?.to_string()
        };
        Some(Hook {
            path: path.to_path_buf(),
            event,
            ordinal: ordinal(&name),
            background: is_background(&name),
            plugin,
            name,
        })
    }

    /// Command prefix: interpreter (if any) followed by the script path.
    pub fn command(&self) -> Vec<String> {
        let script = self.path.to_string_lossy().into_owned();
        match interpreter(&self.path) {
            Some(bin) => vec![bin.to_string(), script],
            None => vec![script],
        }
    }
}

pub fn is_background(name: &str) -> bool {
    name.contains(".bg.") || name.contains("__background")
}

pub fn ordinal(name: &str) -> u8 {
    ORDINAL
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(DEFAULT_ORDINAL)
}

/// `on_Snapshot__50_wget.bg.py` -> `wget`, as does the older
/// `on_Snapshot__50_wget__background.py`.
pub fn plugin_from_file_name(name: &str) -> String {
    let stem = name.split('.').next().unwrap_or(name);
    let stem = stem.strip_suffix("__background").unwrap_or(stem);
    let tail = stem.rsplit("__").next().unwrap_or(stem);
    LEADING_ORDINAL.replace(tail, "").into_owned()
}

pub fn interpreter(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("sh") => Some("bash"),
        Some("py") => Some("python3"),
        Some("js") => Some("node"),
        _ => None,
    }
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
