// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::context::WorkerTarget;
use crate::error::EngineError;
use crate::test_helpers::TestEnv;
use crate::worker::run_worker;
use keep_adapters::{FakeBehavior, Signal};
use keep_core::{ConfigMap, JobStatus, ResultStatus, Snapshot};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn queue_snapshot(env: &TestEnv) -> Snapshot {
    let crawl = env.queue_crawl("https://a.example", 0);
    env.store().get_or_create_snapshot(&Snapshot::new(crawl.id, "https://a.example", 0, env.now())).unwrap().0
}

fn result_status(env: &TestEnv, snapshot: &Snapshot, plugin: &str) -> ResultStatus {
    let results = env.store().results_for_snapshot(&snapshot.id).unwrap();
    results.iter().find(|r| r.plugin == plugin).unwrap().status
}

#[tokio::test(start_paused = true)]
async fn foreground_in_order_background_terminated_before_seal() {
    let env = TestEnv::new();
    env.write_hook("title/on_Snapshot__10_title.sh", "");
    env.write_hook("chrome/on_Snapshot__15_chrome.bg.sh", "");
    env.write_hook("wget/on_Snapshot__20_wget.sh", "");
    env.write_hook("pdf/on_Snapshot__30_pdf.sh", "");
    env.adapter().on("chrome.bg", FakeBehavior::runs());
    let snapshot = queue_snapshot(&env);

    run_worker(&env.ctx, WorkerTarget::Snapshot(snapshot.id.clone()), CancellationToken::new()).await.unwrap();

    let order: Vec<String> = env
        .adapter()
        .spawned()
        .iter()
        .filter_map(|s| s.cmd.iter().find(|a| a.contains("on_Snapshot__")).cloned())
        .collect();
    assert!(order[0].ends_with("on_Snapshot__10_title.sh"));
    assert!(order[1].ends_with("on_Snapshot__15_chrome.bg.sh"));
    assert!(order[2].ends_with("on_Snapshot__20_wget.sh"));
    assert!(order[3].ends_with("on_Snapshot__30_pdf.sh"));

    let chrome = env.adapter().pid_of("chrome.bg").unwrap();
    assert_eq!(env.adapter().signals_for(chrome), vec![Signal::Term]);
    assert_eq!(result_status(&env, &snapshot, "chrome"), ResultStatus::Skipped);
    assert_eq!(result_status(&env, &snapshot, "pdf"), ResultStatus::Succeeded);
    assert_eq!(env.store().require_snapshot(&snapshot.id).unwrap().status, JobStatus::Sealed);
}

#[tokio::test(start_paused = true)]
async fn background_hook_that_exits_is_reaped_with_its_record() {
    let env = TestEnv::new();
    env.write_hook("favicon/on_Snapshot__05_favicon.bg.sh", "");
    env.write_hook("title/on_Snapshot__10_title.sh", "");
    env.adapter().on(
        "favicon.bg",
        FakeBehavior::exits(0).with_stdout("{\"type\": \"ArchiveResult\", \"status\": \"succeeded\", \"output_str\": \"favicon.ico\"}\n"),
    );
    let snapshot = queue_snapshot(&env);

    run_worker(&env.ctx, WorkerTarget::Snapshot(snapshot.id.clone()), CancellationToken::new()).await.unwrap();

    assert_eq!(result_status(&env, &snapshot, "favicon"), ResultStatus::Succeeded);
    assert!(env.adapter().signals().is_empty());
}

#[tokio::test]
async fn failing_hook_does_not_stop_later_hooks() {
    let env = TestEnv::new();
    env.write_hook("title/on_Snapshot__10_title.sh", "");
    env.write_hook("wget/on_Snapshot__20_wget.sh", "");
    env.adapter().on("on_Snapshot__10_title", FakeBehavior::exits(1));
    let snapshot = queue_snapshot(&env);

    run_worker(&env.ctx, WorkerTarget::Snapshot(snapshot.id.clone()), CancellationToken::new()).await.unwrap();

    assert_eq!(result_status(&env, &snapshot, "title"), ResultStatus::Failed);
    assert_eq!(result_status(&env, &snapshot, "wget"), ResultStatus::Succeeded);
    assert_eq!(env.store().require_snapshot(&snapshot.id).unwrap().status, JobStatus::Sealed);
}

#[tokio::test]
async fn all_hooks_failing_fails_snapshot() {
    let env = TestEnv::new();
    env.write_hook("title/on_Snapshot__10_title.sh", "");
    env.adapter().on("on_Snapshot__10_title", FakeBehavior::exits(1));
    let snapshot = queue_snapshot(&env);

    run_worker(&env.ctx, WorkerTarget::Snapshot(snapshot.id.clone()), CancellationToken::new()).await.unwrap();

    assert_eq!(env.store().require_snapshot(&snapshot.id).unwrap().status, JobStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn hook_past_its_timeout_is_terminated_and_failed() {
    let mut env = TestEnv::new();
    env.ctx.config = ConfigMap::new().with("TITLE_TIMEOUT", 1);
    env.write_hook("title/on_Snapshot__10_title.sh", "");
    env.write_hook("wget/on_Snapshot__20_wget.sh", "");
    env.adapter().on("on_Snapshot__10_title", FakeBehavior::runs());
    let snapshot = queue_snapshot(&env);

    run_worker(&env.ctx, WorkerTarget::Snapshot(snapshot.id.clone()), CancellationToken::new()).await.unwrap();

    let title = env.adapter().pid_of("on_Snapshot__10_title").unwrap();
    assert_eq!(env.adapter().signals_for(title), vec![Signal::Term]);
    assert_eq!(result_status(&env, &snapshot, "title"), ResultStatus::Failed);
    assert_eq!(result_status(&env, &snapshot, "wget"), ResultStatus::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn cancelled_worker_requeues_snapshot() {
    let env = TestEnv::new();
    env.write_hook("title/on_Snapshot__10_title.sh", "");
    env.adapter().on("on_Snapshot__10_title", FakeBehavior::runs());
    let snapshot = queue_snapshot(&env);
    let cancel = CancellationToken::new();

    let canceller = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    };
    let (result, _) =
        tokio::join!(run_worker(&env.ctx, WorkerTarget::Snapshot(snapshot.id.clone()), cancel.clone()), canceller);

    assert!(matches!(result, Err(EngineError::Interrupted)));
    let stored = env.store().require_snapshot(&snapshot.id).unwrap();
    assert_eq!(stored.status, JobStatus::Backoff);
    assert_eq!(stored.retry_at_ms, env.now());
    let title = env.adapter().pid_of("on_Snapshot__10_title").unwrap();
    assert!(!env.adapter().running_pids().contains(&title));
}

#[tokio::test]
async fn resumed_snapshot_only_reruns_unfinished_hooks() {
    let env = TestEnv::new();
    env.write_hook("title/on_Snapshot__10_title.sh", "");
    env.write_hook("wget/on_Snapshot__20_wget.sh", "");
    let snapshot = queue_snapshot(&env);
    let now = env.now();
    let mut done = env.store().get_or_create_result(&snapshot.id, "title", "on_Snapshot__10_title.sh", now).unwrap();
    done.try_transition(ResultStatus::Started, now).unwrap();
    done.try_transition(ResultStatus::Succeeded, now).unwrap();
    env.store().save_result(&done).unwrap();

    run_worker(&env.ctx, WorkerTarget::Snapshot(snapshot.id.clone()), CancellationToken::new()).await.unwrap();

    assert!(env.adapter().pid_of("on_Snapshot__10_title").is_none());
    assert!(env.adapter().pid_of("on_Snapshot__20_wget").is_some());
}
