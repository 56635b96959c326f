// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end specs for the `keep` binary.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod prelude;

mod cli;
mod run;
