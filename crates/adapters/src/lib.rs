// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keep-adapters: OS process primitives behind a swappable trait

pub mod process;

pub use process::{
    procfs, ProcessAdapter, ProcessAdapterError, ProcessState, Signal, SpawnSpec, SystemProcessAdapter,
};

#[cfg(any(test, feature = "test-support"))]
pub use process::{FakeBehavior, FakeProcessAdapter, SignalCall};
