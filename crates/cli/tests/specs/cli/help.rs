// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI help output specs

use crate::prelude::*;

#[test]
fn keep_help_shows_usage() {
    cli().args(&["--help"]).passes().stdout_has("Usage:").stdout_has("crawl").stdout_has("status");
}

#[test]
fn keep_no_args_is_a_usage_error() {
    cli().fails().code_is(2).stderr_has("Usage:");
}

#[test]
fn keep_run_help_lists_worker_flags() {
    cli()
        .args(&["run", "--help"])
        .passes()
        .stdout_has("--daemon")
        .stdout_has("--scope")
        .stdout_has("--crawl-id")
        .stdout_has("--snapshot-id")
        .stdout_has("--binary-id")
        .stdout_has("--worker-type");
}

#[test]
fn keep_version_shows_version() {
    cli().args(&["--version"]).passes().stdout_has("0.2");
}

#[test]
fn conflicting_worker_flags_are_rejected() {
    cli().args(&["run", "--crawl-id", "crw-1", "--binary-id", "bin-1"]).fails().code_is(2);
}
