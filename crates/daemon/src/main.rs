// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! keepd: the orchestrator in daemon mode.
//!
//! Holds an exclusive lock on `<data_dir>/logs/keepd.pid`, polls the queues
//! until SIGINT/SIGTERM, then stops its workers and exits.

use std::process::ExitCode;

use keep_daemon::lifecycle::run_daemon;
use keep_daemon::logging::{self, ORCHESTRATOR_LOG};
use keep_daemon::{shutdown_token, LifecycleError, Settings};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "keepd failed");
            eprintln!("keepd: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), LifecycleError> {
    let settings = Settings::load()?;
    let _log = logging::init_with_file(&settings.paths.logs_dir, ORCHESTRATOR_LOG)?;
    let cancel = shutdown_token()?;
    run_daemon(&settings, cancel).await
}
