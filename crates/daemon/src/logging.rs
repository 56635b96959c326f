// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup shared by `keep` and `keepd`.
//!
//! Workers log to stderr, which their parent redirects into the worker's
//! `stderr.log`. Orchestrators additionally append to a log file under
//! `<data_dir>/logs`. Filtering follows `RUST_LOG` and defaults to `info`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const ORCHESTRATOR_LOG: &str = "orchestrator.log";

/// Flushes the file writer when dropped. Keep it alive until exit.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to stderr only.
pub fn init_stderr() -> LogGuard {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
    LogGuard { _file_guard: None }
}

/// Log to stderr and append to `<logs_dir>/<file_name>`.
pub fn init_with_file(logs_dir: &Path, file_name: &str) -> Result<LogGuard, std::io::Error> {
    std::fs::create_dir_all(logs_dir)?;
    let appender = tracing_appender::rolling::never(logs_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false);
    let _ = tracing_subscriber::registry().with(env_filter()).with(file_layer).with(stderr_layer).try_init();
    Ok(LogGuard { _file_guard: Some(guard) })
}
