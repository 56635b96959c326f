// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `keep crawl`: queue and list crawls.

use anyhow::Result;
use clap::{Args, Subcommand};
use keep_core::{Clock, ConfigMap, Crawl, SystemClock};
use keep_daemon::Settings;
use keep_storage::Store;
use serde_json::json;

use crate::color;
use crate::exit_error::ExitError;
use crate::output::{format_time_ago, print_json, OutputFormat};

/// Usage error exit code, matching clap.
const EXIT_USAGE: i32 = 2;

#[derive(Args)]
pub struct CrawlArgs {
    #[command(subcommand)]
    pub command: CrawlCommand,
}

#[derive(Subcommand)]
pub enum CrawlCommand {
    /// Queue a crawl of one or more seed URLs
    Add {
        /// How many link hops to follow from the seeds
        #[arg(long, default_value_t = 0)]
        depth: u32,

        /// Per-crawl config override (repeatable)
        #[arg(short = 'c', long = "config", value_name = "KEY=VALUE", value_parser = parse_config_pair)]
        config: Vec<(String, String)>,

        /// Seed URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// List recent crawls
    List {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

/// Parse a `KEY=VALUE` pair. Keys are upper-cased.
pub fn parse_config_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_ascii_uppercase(), value.to_string()))
}

pub fn handle(args: CrawlArgs) -> Result<()> {
    let settings = Settings::load()?;
    let store = settings.open_store()?;
    let now = SystemClock.epoch_ms();
    match args.command {
        CrawlCommand::Add { depth, config, urls } => {
            let crawl = add(&store, &urls, depth, config, now)?;
            println!("{}", crawl.id);
        }
        CrawlCommand::List { limit, format } => {
            let crawls = store.list_crawls(limit)?;
            match format {
                OutputFormat::Text => print!("{}", render_list(&crawls, now)),
                OutputFormat::Json => {
                    let rows: Vec<_> = crawls.iter().map(crawl_json).collect();
                    print_json(&rows)?;
                }
            }
        }
    }
    Ok(())
}

/// Insert a queued crawl for the non-blank `urls`.
pub fn add(
    store: &Store,
    urls: &[String],
    depth: u32,
    config: Vec<(String, String)>,
    now_ms: u64,
) -> Result<Crawl> {
    let seeds: Vec<&str> = urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()).collect();
    if seeds.is_empty() {
        return Err(ExitError::new(EXIT_USAGE, "no URLs given").into());
    }
    let mut crawl = Crawl::new(seeds.join("\n"), depth, now_ms);
    crawl.config = config.into_iter().map(|(k, v)| (k, v.into())).collect::<ConfigMap>();
    store.insert_crawl(&crawl)?;
    tracing::info!(crawl = %crawl.id, seeds = seeds.len(), depth, "crawl queued");
    Ok(crawl)
}

pub fn render_list(crawls: &[Crawl], now_ms: u64) -> String {
    if crawls.is_empty() {
        return "No crawls\n".to_string();
    }
    let mut out = String::new();
    for crawl in crawls {
        let urls = crawl.url_list();
        let first = urls.first().copied().unwrap_or("");
        let more = urls.len().saturating_sub(1);
        let seeds = if more > 0 { format!("{first} (+{more})") } else { first.to_string() };
        out.push_str(&format!(
            "{}  {} {:>4}  depth={}  {}\n",
            crawl.id,
            color::status(&format!("{:<10}", crawl.status.as_str())),
            format_time_ago(crawl.created_at_ms, now_ms),
            crawl.max_depth,
            seeds,
        ));
    }
    out
}

fn crawl_json(crawl: &Crawl) -> serde_json::Value {
    json!({
        "id": crawl.id.as_str(),
        "urls": crawl.url_list(),
        "max_depth": crawl.max_depth,
        "status": crawl.status.as_str(),
        "retry_at_ms": crawl.retry_at_ms,
        "config": crawl.config,
        "created_at_ms": crawl.created_at_ms,
        "modified_at_ms": crawl.modified_at_ms,
    })
}

#[cfg(test)]
#[path = "crawl_tests.rs"]
mod tests;
