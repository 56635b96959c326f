// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawl queueing and status specs

use crate::prelude::*;

#[test]
fn crawl_list_empty() {
    let temp = Project::empty();
    temp.keep().args(&["crawl", "list"]).passes().stdout_eq("No crawls\n");
}

#[test]
fn crawl_add_prints_id_and_queues() {
    let temp = Project::empty();
    let id = temp.add_crawl(&["https://example.com"]);
    assert!(id.starts_with("crw-"), "unexpected id {id}");

    temp.keep()
        .args(&["crawl", "list"])
        .passes()
        .stdout_has(&id)
        .stdout_has("queued")
        .stdout_has("https://example.com");
    assert_eq!(temp.job_count("crawl", "queued"), 1);
    assert_eq!(temp.status_json()["queued"]["crawls"], 1);
}

#[test]
fn crawl_add_keeps_depth_and_config() {
    let temp = Project::empty();
    let id = temp.add_crawl(&["--depth", "2", "-c", "wget_timeout=15", "https://a.example", "https://b.example"]);

    let out = temp.keep().args(&["crawl", "list", "--format", "json"]).passes().stdout();
    let rows: serde_json::Value = serde_json::from_str(&out).unwrap();
    let row = &rows[0];
    assert_eq!(row["id"], id.as_str());
    assert_eq!(row["max_depth"], 2);
    assert_eq!(row["urls"], serde_json::json!(["https://a.example", "https://b.example"]));
    assert_eq!(row["config"]["WGET_TIMEOUT"], "15");
}

#[test]
fn crawl_add_rejects_blank_urls() {
    let temp = Project::empty();
    temp.keep().args(&["crawl", "add", "  "]).fails().code_is(2).stderr_has("no URLs");
    assert_eq!(temp.job_count("crawl", "queued"), 0);
}

#[test]
fn status_reports_idle_collection() {
    let temp = Project::empty();
    temp.keep()
        .args(&["status"])
        .passes()
        .stdout_has("keepd: not running")
        .stdout_has("0 crawls, 0 snapshots, 0 binaries");
}

#[test]
fn run_with_unknown_scope_fails() {
    let temp = Project::empty();
    temp.keep().args(&["run", "--scope", "crw-missing"]).fails().code_is(1).stderr_has("unknown crawl");
}
