// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook discovery, execution and output handling.

mod discovery;
mod output;
mod runner;

pub use discovery::discover_hooks;
pub use output::{output_size, result_status, HookOutput};
pub use runner::{run_hook, HookArgs, BINARY_HOOK_TIMEOUT};
