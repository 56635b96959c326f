// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process lifecycle: the daemon lock, shutdown signals, errors.

mod lock;
pub use lock::{daemon_pid, DaemonLock};

use keep_engine::Orchestrator;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::settings::Settings;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine a data directory; set KEEP_DATA_DIR")]
    NoDataDir,

    #[error("failed to acquire lock: keepd already running?")]
    LockFailed(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] keep_core::ConfigError),

    #[error(transparent)]
    Store(#[from] keep_storage::StoreError),

    #[error(transparent)]
    Engine(#[from] keep_engine::EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Token cancelled on the first SIGINT or SIGTERM.
///
/// Must be called from within a tokio runtime.
pub fn shutdown_token() -> Result<CancellationToken, LifecycleError> {
    use tokio::signal::unix::{signal, SignalKind};

    let token = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        cancel.cancel();
    });
    Ok(token)
}

/// Run the orchestrator in daemon mode under the pid lock until `cancel`.
pub async fn run_daemon(settings: &Settings, cancel: CancellationToken) -> Result<(), LifecycleError> {
    let lock = DaemonLock::acquire(&settings.lock_path())?;
    info!(
        data_dir = %settings.data_dir().display(),
        machine = %settings.machine,
        pid = std::process::id(),
        "daemon starting"
    );
    let outcome = serve(settings, cancel).await;
    lock.release();
    info!("daemon stopped");
    outcome
}

async fn serve(settings: &Settings, cancel: CancellationToken) -> Result<(), LifecycleError> {
    let store = settings.open_store()?;
    let ctx = settings.engine_context(store);
    let orchestrator = Orchestrator::start(ctx, settings.orchestrator_config(true, None)).await?;
    orchestrator.run(cancel).await?;
    Ok(())
}
