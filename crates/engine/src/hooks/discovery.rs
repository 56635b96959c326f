// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook discovery across plugin roots.

use keep_core::{ConfigMap, Hook, HookEvent};
use std::collections::BTreeMap;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Hooks for `event` under `roots`, sorted by file name (and so by ordinal).
///
/// Roots are scanned in order; a hook whose file name was already found in
/// an earlier root replaces it. Plugins disabled by `config` are dropped.
pub fn discover_hooks(roots: &[PathBuf], event: HookEvent, config: &ConfigMap) -> Vec<Hook> {
    let mut found: BTreeMap<String, Hook> = BTreeMap::new();
    for root in roots {
        if !root.is_dir() {
            continue;
        }
        let entries = WalkDir::new(root).min_depth(1).max_depth(2).sort_by_file_name().into_iter();
        for entry in entries.filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(hook) = Hook::from_path(root, entry.path(), event) {
                found.insert(hook.name.clone(), hook);
            }
        }
    }

    found
        .into_values()
        .filter(|hook| {
            let enabled = config.plugin(&hook.plugin).enabled;
            if !enabled {
                tracing::debug!(hook = %hook.name, plugin = %hook.plugin, "plugin disabled, skipping hook");
            }
            enabled
        })
        .collect()
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
