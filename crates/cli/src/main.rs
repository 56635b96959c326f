// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! keep: queue crawls and run the archiving workers.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod color;
mod commands;
mod exit_error;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::{crawl, run, status};
use crate::exit_error::{ExitError, EXIT_FAILURE};
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "keep", version, about = "Web archive job runner", styles = color::styles())]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator, or a single worker
    Run(run::RunArgs),
    /// Queue and list crawls
    Crawl(crawl::CrawlArgs),
    /// Show queues, job states and running processes
    Status {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run::handle(args).await,
        Command::Crawl(args) => crawl::handle(args),
        Command::Status { format } => status::handle(format),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.downcast_ref::<ExitError>().map_or(EXIT_FAILURE, |x| x.code);
            eprintln!("Error: {e:#}");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
