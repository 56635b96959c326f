// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

#[derive(Parser)]
struct Harness {
    #[command(flatten)]
    run: RunArgs,
}

fn parse(args: &[&str]) -> Result<RunArgs, clap::Error> {
    Harness::try_parse_from(std::iter::once("run").chain(args.iter().copied())).map(|h| h.run)
}

#[test]
fn bare_run_is_the_orchestrator() {
    let args = parse(&[]).unwrap();
    assert_eq!(args.target(), None);
    assert!(!args.daemon);
}

#[yare::parameterized(
    crawl    = { &["--crawl-id", "crw-1"], WorkerTarget::Crawl(CrawlId::from_string("crw-1")) },
    snapshot = { &["--snapshot-id=snp-1"], WorkerTarget::Snapshot(SnapshotId::from_string("snp-1")) },
    binary   = { &["--binary-id", "bin-1"], WorkerTarget::Binary(BinaryId::from_string("bin-1")) },
    queue    = { &["--worker-type", "binary"], WorkerTarget::BinaryQueue },
)]
fn worker_targets(args: &[&str], expected: WorkerTarget) {
    assert_eq!(parse(args).unwrap().target(), Some(expected));
}

#[test]
fn spawned_worker_command_line_parses_back() {
    let target = WorkerTarget::Snapshot(SnapshotId::from_string("snp-abc"));
    let argv = target.args();
    let args: Vec<&str> = argv.iter().skip(1).map(String::as_str).collect();
    assert_eq!(parse(&args).unwrap().target(), Some(target));
}

#[yare::parameterized(
    two_targets      = { &["--crawl-id", "crw-1", "--snapshot-id", "snp-1"] },
    daemon_and_job   = { &["--daemon", "--crawl-id", "crw-1"] },
    scope_and_daemon = { &["--daemon", "--scope", "crw-1"] },
    unknown_type     = { &["--worker-type", "crawl"] },
)]
fn rejects_conflicting_flags(args: &[&str]) {
    let err = parse(args).err().unwrap();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn scope_with_foreground_orchestrator() {
    let args = parse(&["--scope", "crw-1"]).unwrap();
    assert_eq!(args.scope.as_deref(), Some("crw-1"));
    assert_eq!(args.target(), None);
}
