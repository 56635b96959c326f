// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! keep daemon library
//!
//! Settings, logging and lifecycle shared by the `keep` CLI and `keepd`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod lifecycle;
pub mod logging;
pub mod settings;

pub use lifecycle::{daemon_pid, run_daemon, shutdown_token, DaemonLock, LifecycleError};
pub use logging::LogGuard;
pub use settings::{Settings, SystemContext};
