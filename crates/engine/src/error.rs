// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use keep_adapters::ProcessAdapterError;
use keep_core::{ProcessId, TransitionNotAllowed};
use keep_storage::StoreError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the supervisor, workers and orchestrator
#[derive(Debug, Error)]
pub enum EngineError {
    /// The executable or working directory was unusable.
    #[error("failed to launch `{cmd}`: {source}")]
    Launch {
        cmd: String,
        #[source]
        source: ProcessAdapterError,
    },

    #[error("process {id} still running after {timeout:?}")]
    Timeout { id: ProcessId, timeout: Duration },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("process error: {0}")]
    Adapter(#[from] ProcessAdapterError),

    #[error(transparent)]
    Transition(#[from] TransitionNotAllowed),

    #[error("interrupted")]
    Interrupted,
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io { path: path.into(), source }
    }
}
