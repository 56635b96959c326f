// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::machine::start;
use crate::test_helpers::TestEnv;
use keep_adapters::FakeBehavior;
use keep_core::job::BACKOFF_DELAY;

fn started_crawl(env: &TestEnv, urls: &str, max_depth: u32) -> Crawl {
    let mut crawl = env.queue_crawl(urls, max_depth);
    assert!(start(env.store(), &mut crawl, BACKOFF_DELAY, env.now()).unwrap());
    crawl
}

#[tokio::test]
async fn creates_one_root_snapshot_per_url() {
    let env = TestEnv::new();
    let crawl = started_crawl(&env, "https://a.example\n\nhttps://b.example\nhttps://a.example\n", 0);

    let snapshots = run_crawl(&env.ctx, &crawl, None, &CancellationToken::new()).await.unwrap();

    let urls: Vec<&str> = snapshots.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(urls.len(), 2);
    assert!(urls.contains(&"https://a.example") && urls.contains(&"https://b.example"));
    assert!(snapshots.iter().all(|s| s.depth == 0 && s.status == JobStatus::Queued));
}

#[tokio::test]
async fn crawl_hook_records_are_applied() {
    let env = TestEnv::new();
    env.write_hook("sitemap/on_Crawl__10_sitemap.sh", "");
    env.adapter().on(
        "sitemap",
        FakeBehavior::exits(0).with_stdout(
            r#"{"type": "Snapshot", "url": "https://a.example/about"}
{"type": "Snapshot", "url": "https://a.example/deep", "depth": 3}
"#,
        ),
    );
    let crawl = started_crawl(&env, "https://a.example", 1);

    let snapshots = run_crawl(&env.ctx, &crawl, None, &CancellationToken::new()).await.unwrap();

    let urls: Vec<&str> = snapshots.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(urls.len(), 2);
    assert!(urls.contains(&"https://a.example/about"));
    let spec = &env.adapter().spawned()[0];
    assert!(spec.cmd.contains(&format!("--crawl-id={}", crawl.id)));
    assert!(spec.cwd.ends_with("sitemap"));
}

#[tokio::test]
async fn queued_binaries_install_before_snapshots() {
    let env = TestEnv::new();
    env.write_hook("wget/on_Crawl__00_wget_install.sh", "");
    env.write_hook("apt/on_Binary__10_apt_install.sh", "");
    env.adapter().on("wget_install", FakeBehavior::exits(0).with_stdout("{\"type\": \"Binary\", \"name\": \"wget\"}\n"));
    env.adapter().on(
        "apt_install",
        FakeBehavior::exits(0).with_stdout("{\"type\": \"Binary\", \"name\": \"wget\", \"abspath\": \"/usr/bin/wget\"}\n"),
    );
    let crawl = started_crawl(&env, "https://a.example", 0);

    run_crawl(&env.ctx, &crawl, None, &CancellationToken::new()).await.unwrap();

    let wget = env.store().binary_by_name(&env.ctx.machine, "wget").unwrap().unwrap();
    assert!(wget.is_installed());
}

#[tokio::test(start_paused = true)]
async fn background_crawl_hooks_outlive_run_until_seal() {
    let env = TestEnv::new();
    env.write_hook("chrome/on_Crawl__20_chrome_launch.bg.sh", "");
    env.adapter().on("chrome_launch", FakeBehavior::runs());
    let mut crawl = started_crawl(&env, "https://a.example", 0);

    run_crawl(&env.ctx, &crawl, None, &CancellationToken::new()).await.unwrap();
    let pid = env.adapter().pid_of("chrome_launch").unwrap();
    assert!(env.adapter().running_pids().contains(&pid));

    for snapshot in env.store().snapshots_for_crawl(&crawl.id).unwrap() {
        env.store().set_snapshot_status(&snapshot.id, JobStatus::Sealed, env.now()).unwrap();
    }
    assert!(is_crawl_finished(&env.ctx, &crawl).unwrap());
    let status = seal_crawl(&env.ctx, &mut crawl, None, &CancellationToken::new()).await.unwrap();

    assert_eq!(status, JobStatus::Sealed);
    assert!(!env.adapter().running_pids().contains(&pid));
    assert_eq!(env.store().require_crawl(&crawl.id).unwrap().status, JobStatus::Sealed);
}

#[tokio::test]
async fn crawl_without_snapshots_is_finished() {
    let env = TestEnv::new();
    let mut crawl = started_crawl(&env, "https://a.example", 0);

    assert!(is_crawl_finished(&env.ctx, &crawl).unwrap());
    let status = seal_crawl(&env.ctx, &mut crawl, None, &CancellationToken::new()).await.unwrap();

    assert_eq!(status, JobStatus::Sealed);
}

#[tokio::test]
async fn pending_snapshot_blocks_finish() {
    let env = TestEnv::new();
    let crawl = started_crawl(&env, "https://a.example\nhttps://b.example", 0);
    let snapshots = run_crawl(&env.ctx, &crawl, None, &CancellationToken::new()).await.unwrap();
    env.store().set_snapshot_status(&snapshots[0].id, JobStatus::Sealed, env.now()).unwrap();

    assert!(!is_crawl_finished(&env.ctx, &crawl).unwrap());
}

#[yare::parameterized(
    all_sealed  = { &[JobStatus::Sealed, JobStatus::Sealed], JobStatus::Sealed },
    some_failed = { &[JobStatus::Sealed, JobStatus::Failed], JobStatus::Sealed },
    all_failed  = { &[JobStatus::Failed, JobStatus::Failed], JobStatus::Failed },
)]
fn seal_status_follows_children(children: &[JobStatus], expected: JobStatus) {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    rt.block_on(async {
        let env = TestEnv::new();
        let mut crawl = started_crawl(&env, "https://a.example", 0);
        for (i, status) in children.iter().enumerate() {
            let (snapshot, _) = env
                .store()
                .get_or_create_snapshot(&Snapshot::new(crawl.id.clone(), format!("https://a.example/{i}"), 0, env.now()))
                .unwrap();
            env.store().set_snapshot_status(&snapshot.id, *status, env.now()).unwrap();
        }

        assert_eq!(seal_crawl(&env.ctx, &mut crawl, None, &CancellationToken::new()).await.unwrap(), expected);
    });
}

#[tokio::test]
async fn crawl_end_hooks_run_on_seal_and_failures_are_tolerated() {
    let env = TestEnv::new();
    env.write_hook("report/on_CrawlEnd__90_report.sh", "");
    env.adapter().on("report", FakeBehavior::exits(1));
    let mut crawl = started_crawl(&env, "https://a.example", 0);
    std::fs::create_dir_all(env.ctx.paths.crawl_dir(&crawl.id)).unwrap();
    std::fs::write(env.ctx.paths.crawl_dir(&crawl.id).join("stale.pid"), "1").unwrap();

    let status = seal_crawl(&env.ctx, &mut crawl, None, &CancellationToken::new()).await.unwrap();

    assert_eq!(status, JobStatus::Sealed);
    assert!(env.adapter().pid_of("on_CrawlEnd__90_report").is_some());
    assert!(!env.ctx.paths.crawl_dir(&crawl.id).join("stale.pid").exists());
}
