// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::context::{Tuning, WorkerTarget};
use crate::error::EngineError;
use crate::test_helpers::TestEnv;
use crate::worker::run_worker;
use keep_adapters::FakeBehavior;
use keep_core::process::cmd_flag_value;
use keep_core::test_support::running_worker;
use keep_core::{Crawl, JobKind, JobStatus, WorkerKind};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(100);

/// Act as the snapshot workers: seal each snapshot whose worker was
/// spawned and make the worker exit. Returns the peak number of snapshot
/// workers observed running at once.
async fn seal_spawned_snapshots(env: &TestEnv, crawl: &Crawl, expected: usize) -> usize {
    let mut sealed = HashSet::new();
    let mut peak = 0;
    while sealed.len() < expected {
        tokio::time::sleep(TICK).await;
        let running = env.store().get_running(None, Some(WorkerKind::Snapshot)).unwrap();
        peak = peak.max(running.len());
        for spec in env.adapter().spawned() {
            let Some(id) = cmd_flag_value(&spec.cmd, WorkerTarget::SNAPSHOT_FLAG) else {
                continue;
            };
            if !sealed.insert(id.to_string()) {
                continue;
            }
            assert_eq!(env.store().require_snapshot(id).unwrap().crawl_id, crawl.id);
            env.store().set_snapshot_status(id, JobStatus::Sealed, env.now()).unwrap();
            env.adapter().exit(env.adapter().pid_of(id).unwrap(), 0);
        }
    }
    peak
}

#[tokio::test(start_paused = true)]
async fn spawns_snapshot_workers_then_seals() {
    let env = TestEnv::new();
    env.adapter().on(WorkerTarget::SNAPSHOT_FLAG, FakeBehavior::runs());
    let crawl = env.queue_crawl("https://a.example\nhttps://b.example", 0);

    let (result, _) = tokio::join!(
        run_worker(&env.ctx, WorkerTarget::Crawl(crawl.id.clone()), CancellationToken::new()),
        seal_spawned_snapshots(&env, &crawl, 2),
    );

    result.unwrap();
    assert_eq!(env.store().require_crawl(&crawl.id).unwrap().status, JobStatus::Sealed);
    let spawned = env.adapter().spawned();
    let child = spawned.iter().find(|s| s.cmd.contains(&WorkerTarget::SNAPSHOT_FLAG.to_string())).unwrap();
    let child_record = env.store().get_process(child.env.get("KEEP_PROCESS_ID").unwrap()).unwrap().unwrap();
    assert_eq!(child_record.worker_kind, Some(WorkerKind::Snapshot));
    let parent = env.store().get_process(child_record.parent_id.as_ref().unwrap()).unwrap().unwrap();
    assert_eq!(parent.worker_kind, Some(WorkerKind::Crawl));
    assert_eq!(parent.exit_code, Some(0));
}

#[tokio::test(start_paused = true)]
async fn snapshot_workers_respect_ceiling() {
    let mut env = TestEnv::new();
    env.ctx.tuning = Tuning { max_snapshot_workers: 1, ..Tuning::default() };
    env.adapter().on(WorkerTarget::SNAPSHOT_FLAG, FakeBehavior::runs());
    let crawl = env.queue_crawl("https://a.example\nhttps://b.example\nhttps://c.example", 0);

    let (result, peak) = tokio::join!(
        run_worker(&env.ctx, WorkerTarget::Crawl(crawl.id.clone()), CancellationToken::new()),
        seal_spawned_snapshots(&env, &crawl, 3),
    );

    result.unwrap();
    assert_eq!(peak, 1);
}

#[tokio::test(start_paused = true)]
async fn snapshot_with_live_worker_is_not_respawned() {
    let env = TestEnv::new();
    env.adapter().on(WorkerTarget::SNAPSHOT_FLAG, FakeBehavior::runs());
    let crawl = env.queue_crawl("https://a.example\nhttps://b.example", 0);
    let mut crawl_started = crawl.clone();
    crate::machine::start(env.store(), &mut crawl_started, Duration::ZERO, env.now()).unwrap();
    let roots = crate::machine::crawl::create_root_snapshots(&env.ctx, &crawl_started).unwrap();
    let taken = &roots[0];
    env.adapter().insert_foreign(4242, None, env.now());
    let external = running_worker(WorkerKind::Snapshot, WorkerTarget::SNAPSHOT_FLAG, &taken.id, 4242, env.now());
    env.store().insert_process(&external).unwrap();

    let driver = async {
        seal_spawned_snapshots(&env, &crawl, 1).await;
        env.store().set_snapshot_status(&taken.id, JobStatus::Sealed, env.now()).unwrap();
    };
    let (result, _) = tokio::join!(
        run_worker(&env.ctx, WorkerTarget::Crawl(crawl.id.clone()), CancellationToken::new()),
        driver,
    );

    result.unwrap();
    assert!(env.adapter().pid_of(&taken.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn early_worker_exit_backs_off_snapshot_and_cancel_requeues_crawl() {
    let env = TestEnv::new();
    env.adapter().on(WorkerTarget::SNAPSHOT_FLAG, FakeBehavior::exits(1));
    let crawl = env.queue_crawl("https://a.example", 0);
    let cancel = CancellationToken::new();

    let driver = async {
        loop {
            tokio::time::sleep(TICK).await;
            let snapshots = env.store().snapshots_for_crawl(&crawl.id).unwrap();
            let backed_off = snapshots.first().and_then(|s| env.store().retry_at(JobKind::Snapshot, &s.id).unwrap());
            if backed_off == Some(env.now() + 60_000) {
                break;
            }
        }
        cancel.cancel();
    };
    let (result, _) = tokio::join!(run_worker(&env.ctx, WorkerTarget::Crawl(crawl.id.clone()), cancel.clone()), driver);

    assert!(matches!(result, Err(EngineError::Interrupted)));
    let stored = env.store().require_crawl(&crawl.id).unwrap();
    assert_eq!(stored.status, JobStatus::Backoff);
    assert_eq!(stored.retry_at_ms, env.now());
    assert_eq!(env.adapter().spawned().len(), 1, "backed-off snapshot must not be respawned");
}

#[tokio::test]
async fn standalone_worker_skips_claimed_crawl() {
    let env = TestEnv::new();
    let crawl = env.queue_crawl("https://a.example", 0);
    env.store().set_retry_at(JobKind::Crawl, &crawl.id, env.now() + 1_000, env.now()).unwrap();

    run_worker(&env.ctx, WorkerTarget::Crawl(crawl.id.clone()), CancellationToken::new()).await.unwrap();

    assert_eq!(env.store().require_crawl(&crawl.id).unwrap().status, JobStatus::Queued);
    assert!(env.adapter().spawned().is_empty());
}

#[tokio::test(start_paused = true)]
async fn resumed_crawl_skips_hooks() {
    let env = TestEnv::new();
    env.write_hook("sitemap/on_Crawl__10_sitemap.sh", "");
    env.adapter().on(WorkerTarget::SNAPSHOT_FLAG, FakeBehavior::runs());
    let crawl = env.queue_crawl("https://a.example", 0);
    env.store().set_crawl_status(&crawl.id, JobStatus::Started, env.now()).unwrap();

    let (result, _) = tokio::join!(
        run_worker(&env.ctx, WorkerTarget::Crawl(crawl.id.clone()), CancellationToken::new()),
        seal_spawned_snapshots(&env, &crawl, 1),
    );

    result.unwrap();
    assert!(env.adapter().pid_of("on_Crawl__10_sitemap").is_none());
    assert_eq!(env.store().require_crawl(&crawl.id).unwrap().status, JobStatus::Sealed);
}

#[tokio::test]
async fn crawl_without_urls_is_rescheduled() {
    let env = TestEnv::new();
    let crawl = env.queue_crawl("\n# nothing\n", 0);

    run_worker(&env.ctx, WorkerTarget::Crawl(crawl.id.clone()), CancellationToken::new()).await.unwrap();

    let stored = env.store().require_crawl(&crawl.id).unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.retry_at_ms, env.now() + 60_000);
}
