// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keep-engine: job state machines, hook execution, workers and the
//! orchestrator
//!
//! Everything here is generic over a [`ProcessAdapter`](keep_adapters::ProcessAdapter)
//! and a [`Clock`](keep_core::Clock) so the whole pipeline runs against
//! fakes in tests.

pub mod context;
pub mod error;
pub mod hooks;
pub mod machine;
pub mod orchestrator;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
mod test_helpers;

pub use context::{EngineContext, Paths, Tuning, WorkerTarget};
pub use error::EngineError;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use supervisor::Supervisor;
pub use worker::{run_worker, spawn_worker, PROCESS_ID_ENV};
