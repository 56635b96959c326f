// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::machine::start;
use crate::test_helpers::TestEnv;
use keep_core::job::BACKOFF_DELAY;
use keep_core::{CrawlId, ProcessStatus, WorkerKind};

#[tokio::test]
async fn spawned_worker_carries_its_record_id() {
    let env = TestEnv::new();
    let parent = env.record(ProcessKind::Orchestrator, &["keep", "run"]);
    env.store().insert_process(&parent).unwrap();
    let target = WorkerTarget::Crawl(CrawlId::from_string("crw-1"));

    let record = spawn_worker(&env.ctx, &target, Some(&parent.id)).await.unwrap();

    assert!(record.is_running());
    assert_eq!(record.parent_id.as_ref(), Some(&parent.id));
    assert_eq!(record.worker_kind, Some(WorkerKind::Crawl));
    assert_eq!(record.timeout, WORKER_TIMEOUT);
    assert_eq!(record.pwd, env.ctx.paths.worker_dir(&record.id));
    let spec = env.adapter().spawned().pop().unwrap();
    assert_eq!(spec.cmd, vec!["/usr/local/bin/keep", "run", "--crawl-id", "crw-1"]);
    assert_eq!(spec.env.get(PROCESS_ID_ENV), Some(&record.id.to_string()));
    assert!(spec.env.contains_key("KEEP_DATA_DIR"));
}

#[test]
fn standalone_worker_registers_own_record() {
    let env = TestEnv::new();
    let target = WorkerTarget::BinaryQueue;

    let record = register_self(&env.ctx, &target).unwrap();

    assert_eq!(record.pid, Some(std::process::id()));
    assert_eq!(record.parent_id, None);
    assert_eq!(record.cmd_flag_value(WorkerTarget::WORKER_TYPE_FLAG), Some("binary"));
    assert!(env.store().get_process(&record.id).unwrap().unwrap().is_running());
    assert!(!claimed_by_parent(&env.ctx));
}

#[test]
fn child_worker_adopts_parent_record() {
    let mut env = TestEnv::new();
    let mut created = env.record(ProcessKind::Worker, &["keep", "run", "--crawl-id", "crw-1"]);
    created.mark_running(1000, env.now());
    env.store().insert_process(&created).unwrap();
    env.ctx.inherited_process = Some(created.id.clone());

    let record = register_self(&env.ctx, &WorkerTarget::Crawl(CrawlId::from_string("crw-1"))).unwrap();

    assert_eq!(record.id, created.id);
    assert_eq!(record.pid, Some(std::process::id()));
    assert_eq!(record.status, ProcessStatus::Running);
    assert!(claimed_by_parent(&env.ctx));
    assert_eq!(env.store().get_running(Some(ProcessKind::Worker), None).unwrap().len(), 1);
}

#[tokio::test]
async fn failed_worker_records_exit_code_one() {
    let mut env = TestEnv::new();
    let created = env.record(ProcessKind::Worker, &["keep", "run", "--crawl-id", "crw-missing"]);
    env.store().insert_process(&created).unwrap();
    env.ctx.inherited_process = Some(created.id.clone());
    let target = WorkerTarget::Crawl(CrawlId::from_string("crw-missing"));

    let result = run_worker(&env.ctx, target, CancellationToken::new()).await;

    assert!(result.is_err());
    let record = env.store().get_process(&created.id).unwrap().unwrap();
    assert_eq!(record.exit_code, Some(1));
    assert!(record.is_exited());
}

#[yare::parameterized(
    interrupted = { EngineError::Interrupted, JobStatus::Backoff },
    other       = { EngineError::Timeout { id: ProcessId::from_string("prc-1"), timeout: Duration::from_secs(1) }, JobStatus::Failed },
)]
fn settle_started_job(error: EngineError, expected: JobStatus) {
    let env = TestEnv::new();
    let mut crawl = env.queue_crawl("https://a.example", 0);
    assert!(start(env.store(), &mut crawl, BACKOFF_DELAY, env.now()).unwrap());

    settle_job(env.store(), &mut crawl, &error, env.now()).unwrap();

    let stored = env.store().require_crawl(&crawl.id).unwrap();
    assert_eq!(stored.status, expected);
    if expected == JobStatus::Backoff {
        assert_eq!(stored.retry_at_ms, env.now());
    }
}

#[test]
fn settle_leaves_finished_job_alone() {
    let env = TestEnv::new();
    let mut crawl = env.queue_crawl("https://a.example", 0);
    env.store().set_crawl_status(&crawl.id, JobStatus::Sealed, env.now()).unwrap();
    crawl.status = JobStatus::Sealed;

    settle_job(env.store(), &mut crawl, &EngineError::Interrupted, env.now()).unwrap();

    assert_eq!(env.store().require_crawl(&crawl.id).unwrap().status, JobStatus::Sealed);
}

#[tokio::test(start_paused = true)]
async fn pause_returns_interrupted_on_cancel() {
    let cancel = CancellationToken::new();
    assert!(pause(&cancel, Duration::from_millis(10)).await.is_ok());
    cancel.cancel();
    assert!(matches!(pause(&cancel, Duration::from_secs(60)).await, Err(EngineError::Interrupted)));
}
