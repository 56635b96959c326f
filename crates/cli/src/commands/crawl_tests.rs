// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use keep_core::JobStatus;

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[yare::parameterized(
    plain      = { "TIMEOUT=30", ("TIMEOUT", "30") },
    lowercase  = { "wget_enabled=false", ("WGET_ENABLED", "false") },
    empty_val  = { "COOKIES_FILE=", ("COOKIES_FILE", "") },
    equals_val = { "USER_AGENT=a=b", ("USER_AGENT", "a=b") },
)]
fn config_pairs(input: &str, expected: (&str, &str)) {
    assert_eq!(parse_config_pair(input), Ok((expected.0.to_string(), expected.1.to_string())));
}

#[yare::parameterized(
    no_equals = { "TIMEOUT" },
    no_key    = { "=30" },
)]
fn bad_config_pairs(input: &str) {
    assert!(parse_config_pair(input).is_err());
}

#[test]
fn add_queues_crawl_with_config() {
    let store = Store::open_in_memory().unwrap();
    let crawl = add(
        &store,
        &urls(&["https://example.com", " https://example.org "]),
        1,
        vec![("WGET_TIMEOUT".to_string(), "15".to_string())],
        5_000,
    )
    .unwrap();

    let stored = store.require_crawl(crawl.id.as_str()).unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.max_depth, 1);
    assert_eq!(stored.url_list(), vec!["https://example.com", "https://example.org"]);
    assert_eq!(stored.config.get_u64("WGET_TIMEOUT"), Some(15));
    assert_eq!(stored.retry_at_ms, 5_000);
}

#[test]
fn add_rejects_blank_urls() {
    let store = Store::open_in_memory().unwrap();
    let err = add(&store, &urls(&["  ", ""]), 0, vec![], 0).unwrap_err();
    let exit = err.downcast_ref::<ExitError>().unwrap();
    assert_eq!(exit.code, 2);
    assert!(store.list_crawls(10).unwrap().is_empty());
}

#[test]
fn list_renders_newest_first() {
    let store = Store::open_in_memory().unwrap();
    let old = add(&store, &urls(&["https://old.example"]), 0, vec![], 1_000).unwrap();
    let new = add(&store, &urls(&["https://a.example", "https://b.example"]), 2, vec![], 61_000).unwrap();

    let text = render_list(&store.list_crawls(10).unwrap(), 121_000);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with(new.id.as_str()));
    assert!(lines[0].contains("https://a.example (+1)"));
    assert!(lines[0].contains("depth=2"));
    assert!(lines[0].contains("1m"));
    assert!(lines[1].starts_with(old.id.as_str()));
    assert!(lines[1].contains("queued"));
}

#[test]
fn empty_list() {
    assert_eq!(render_list(&[], 0), "No crawls\n");
}

#[test]
fn json_row_fields() {
    let mut crawl = Crawl::new("https://example.com\nhttps://example.org", 3, 42);
    crawl.config.insert("TIMEOUT", 10);
    let row = crawl_json(&crawl);
    assert_eq!(row["id"], crawl.id.as_str());
    assert_eq!(row["urls"], json!(["https://example.com", "https://example.org"]));
    assert_eq!(row["status"], "queued");
    assert_eq!(row["max_depth"], 3);
    assert_eq!(row["config"]["TIMEOUT"], 10);
}
