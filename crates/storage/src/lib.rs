// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keep-storage: SQLite datastore shared by every keep process
//!
//! Each OS process opens its own connection to the same database file. The
//! datastore is the only coordination point between processes; job claims
//! are single-row compare-and-swap updates on `retry_at`.

mod binaries;
mod crawls;
mod migration;
mod processes;
mod results;
mod rows;
mod snapshots;
mod store;

pub use migration::{MigrationError, SCHEMA_VERSION};
pub use store::{QueueCounts, Store, StoreError};
