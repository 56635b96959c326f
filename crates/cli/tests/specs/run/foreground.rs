// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Foreground `keep run`: drains the queues through real worker processes
//! and exits.

use crate::prelude::*;

/// Crawl hook that discovers one extra page per seed.
const DISCOVER_HOOK: &str = r#"#!/usr/bin/env bash
for arg in "$@"; do
  case "$arg" in --source-url=*) src="${arg#--source-url=}" ;; esac
done
echo "{\"type\":\"Snapshot\",\"url\":\"${src}/about\",\"depth\":1}"
"#;

/// Snapshot hook that always fails.
const FAILING_HOOK: &str = "#!/usr/bin/env bash\necho boom >&2\nexit 3\n";

#[test]
fn run_with_nothing_queued_exits() {
    let temp = Project::empty();
    temp.keep().args(&["run"]).passes();
}

#[test]
fn run_archives_seed_urls_and_seals_crawl() {
    let temp = Project::empty();
    temp.hook("saveurl", "on_Snapshot__50_saveurl.sh", SAVE_URL_HOOK);
    temp.add_crawl(&["https://example.com", "https://example.org"]);

    temp.keep().args(&["run"]).passes();

    assert_eq!(temp.job_count("crawl", "sealed"), 1);
    assert_eq!(temp.job_count("snapshot", "sealed"), 2);
    let saved = temp.archived("saved.txt");
    assert_eq!(saved.len(), 2);
    let mut urls: Vec<String> = saved.iter().map(|p| std::fs::read_to_string(p).unwrap().trim().to_string()).collect();
    urls.sort();
    assert_eq!(urls, vec!["https://example.com", "https://example.org"]);

    let report = temp.status_json();
    assert_eq!(report["queued"]["crawls"], 0);
    assert_eq!(report["processes"], serde_json::json!([]));
}

#[test]
fn crawl_hook_discoveries_follow_max_depth() {
    let temp = Project::empty();
    temp.hook("discover", "on_Crawl__10_discover.sh", DISCOVER_HOOK);
    temp.hook("saveurl", "on_Snapshot__50_saveurl.sh", SAVE_URL_HOOK);
    temp.add_crawl(&["--depth", "1", "https://example.com"]);

    temp.keep().args(&["run"]).passes();

    assert_eq!(temp.job_count("crawl", "sealed"), 1);
    assert_eq!(temp.job_count("snapshot", "sealed"), 2);
    assert_eq!(temp.archived("saved.txt").len(), 2);
}

#[test]
fn discoveries_past_max_depth_are_dropped() {
    let temp = Project::empty();
    temp.hook("discover", "on_Crawl__10_discover.sh", DISCOVER_HOOK);
    temp.hook("saveurl", "on_Snapshot__50_saveurl.sh", SAVE_URL_HOOK);
    temp.add_crawl(&["https://example.com"]);

    temp.keep().args(&["run"]).passes();

    assert_eq!(temp.job_count("snapshot", "sealed"), 1);
}

#[test]
fn failing_hook_does_not_block_sealing() {
    let temp = Project::empty();
    temp.hook("broken", "on_Snapshot__40_broken.sh", FAILING_HOOK);
    temp.hook("saveurl", "on_Snapshot__50_saveurl.sh", SAVE_URL_HOOK);
    temp.add_crawl(&["https://example.com"]);

    temp.keep().args(&["run"]).passes();

    assert_eq!(temp.job_count("crawl", "sealed") + temp.job_count("crawl", "failed"), 1);
    assert_eq!(temp.archived("saved.txt").len(), 1);
}

#[test]
fn disabled_plugin_is_skipped() {
    let temp = Project::empty();
    temp.hook("saveurl", "on_Snapshot__50_saveurl.sh", SAVE_URL_HOOK);
    temp.add_crawl(&["https://example.com"]);

    temp.keep().env("SAVEURL_ENABLED", "false").args(&["run"]).passes();

    assert_eq!(temp.job_count("crawl", "sealed"), 1);
    assert!(temp.archived("saved.txt").is_empty());
}

#[test]
fn scoped_run_leaves_other_crawls_queued() {
    let temp = Project::empty();
    temp.hook("noop", "on_Crawl__10_noop.sh", NOOP_HOOK);
    let first = temp.add_crawl(&["https://one.example"]);
    temp.add_crawl(&["https://two.example"]);

    temp.keep().args(&["run", "--scope", &first]).passes();

    assert_eq!(temp.job_count("crawl", "sealed"), 1);
    assert_eq!(temp.job_count("crawl", "queued"), 1);
    temp.keep().args(&["crawl", "list"]).passes().stdout_has(&format!("{first}  sealed"));
}
