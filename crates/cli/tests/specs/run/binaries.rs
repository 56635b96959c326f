// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependencies queued by hooks and installed by binary workers

use crate::prelude::*;

/// Crawl hook that asks for `fakebin`.
const NEEDS_BINARY_HOOK: &str = r#"#!/usr/bin/env bash
echo '{"type":"Binary","name":"fakebin","binproviders":"env"}'
"#;

/// Install hook that "installs" whatever it is asked for.
const INSTALL_HOOK: &str = r#"#!/usr/bin/env bash
for arg in "$@"; do
  case "$arg" in --name=*) name="${arg#--name=}" ;; esac
done
touch "$name"
echo "{\"type\":\"Binary\",\"name\":\"${name}\",\"abspath\":\"$PWD/${name}\",\"version\":\"1.0.0\",\"binprovider\":\"env\"}"
"#;

#[test]
fn crawl_hook_binary_is_installed_before_snapshots() {
    let temp = Project::empty();
    temp.hook("needs", "on_Crawl__10_needs.sh", NEEDS_BINARY_HOOK);
    temp.hook("env", "on_Binary__10_env.sh", INSTALL_HOOK);
    temp.hook("saveurl", "on_Snapshot__50_saveurl.sh", SAVE_URL_HOOK);
    temp.add_crawl(&["https://example.com"]);

    temp.keep().args(&["run"]).passes();

    assert_eq!(temp.job_count("binary", "installed"), 1);
    assert_eq!(temp.job_count("binary", "queued"), 0);
    assert_eq!(temp.job_count("crawl", "sealed"), 1);
    assert_eq!(temp.archived("saved.txt").len(), 1);
}

#[test]
fn binary_queue_worker_exits_when_idle() {
    let temp = Project::empty();
    temp.keep().args(&["run", "--worker-type", "binary"]).passes();
    assert_eq!(temp.status_json()["processes"], serde_json::json!([]));
}

#[test]
fn binary_worker_for_unknown_id_fails() {
    let temp = Project::empty();
    temp.keep().args(&["run", "--binary-id", "bin-missing"]).fails().code_is(1);
}
