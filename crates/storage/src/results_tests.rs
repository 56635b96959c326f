// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use keep_core::{Crawl, ProcessRecord, Snapshot};
use std::sync::{Arc, Barrier};

fn snapshot() -> SnapshotId {
    SnapshotId::from_string("snp-1")
}

/// Store holding the crawl and snapshot every result here hangs off.
fn seeded(store: Store) -> Store {
    let crawl = Crawl::new("https://example.com", 0, 0);
    store.insert_crawl(&crawl).unwrap();
    let mut snap = Snapshot::new(crawl.id.clone(), "https://example.com", 0, 0);
    snap.id = snapshot();
    store.get_or_create_snapshot(&snap).unwrap();
    store
}

#[test]
fn get_or_create_is_idempotent() {
    let store = seeded(Store::open_in_memory().unwrap());
    let a = store.get_or_create_result(&snapshot(), "wget", "on_Snapshot__50_wget.sh", 10).unwrap();
    let b = store.get_or_create_result(&snapshot(), "wget", "on_Snapshot__50_wget.sh", 20).unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(b.created_at_ms, 10);
    assert_eq!(store.results_for_snapshot(&snapshot()).unwrap().len(), 1);
}

#[test]
fn concurrent_creation_yields_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite3");
    seeded(Store::open(&path).unwrap());

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let path = path.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let store = Store::open(&path).unwrap();
                barrier.wait();
                store.get_or_create_result(&snapshot(), "title", "on_Snapshot__10_title.py", i).unwrap().id
            })
        })
        .collect();
    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(Store::open(&path).unwrap().results_for_snapshot(&snapshot()).unwrap().len(), 1);
}

#[test]
fn save_round_trips_outcome() {
    let store = seeded(Store::open_in_memory().unwrap());
    let hook = ProcessRecord::builder().build();
    store.insert_process(&hook).unwrap();
    let mut r = store.get_or_create_result(&snapshot(), "wget", "on_Snapshot__50_wget.sh", 10).unwrap();
    r.try_transition(ResultStatus::Started, 11).unwrap();
    r.process_id = Some(hook.id.clone());
    r.output_str = "index.html".into();
    r.output_size = 2048;
    r.try_transition(ResultStatus::Succeeded, 12).unwrap();
    store.save_result(&r).unwrap();
    assert_eq!(store.get_result(&r.id).unwrap(), Some(r));
}

#[test]
fn delete_queued_only() {
    let store = seeded(Store::open_in_memory().unwrap());
    let mut ran = store.get_or_create_result(&snapshot(), "a", "on_Snapshot__10_a.sh", 1).unwrap();
    ran.try_transition(ResultStatus::Started, 2).unwrap();
    store.save_result(&ran).unwrap();
    store.get_or_create_result(&snapshot(), "b", "on_Snapshot__20_b.sh", 1).unwrap();

    assert_eq!(store.delete_queued_results(&snapshot()).unwrap(), 1);
    let left: Vec<_> = store.results_for_snapshot(&snapshot()).unwrap().into_iter().map(|r| r.plugin).collect();
    assert_eq!(left, vec!["a"]);
}

#[test]
fn result_needs_an_existing_snapshot() {
    let store = Store::open_in_memory().unwrap();
    assert!(store.get_or_create_result(&snapshot(), "wget", "on_Snapshot__50_wget.sh", 10).is_err());
}
