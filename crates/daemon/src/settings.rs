// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved settings for one keep process: paths, tuning and the
//! archiving config handed to hooks.

use std::path::{Path, PathBuf};
use std::time::Duration;

use keep_adapters::SystemProcessAdapter;
use keep_core::config::DEFAULT_HOOK_TIMEOUT;
use keep_core::{ConfigMap, CrawlId, MachineId, ProcessId, SystemClock};
use keep_engine::{EngineContext, OrchestratorConfig, Paths, Tuning};
use keep_storage::Store;

use crate::env;
use crate::lifecycle::LifecycleError;

/// Context type used by the real binaries.
pub type SystemContext = EngineContext<SystemProcessAdapter, SystemClock>;

pub const DB_FILE: &str = "index.sqlite3";
pub const CONFIG_FILE: &str = "keep.toml";
pub const LOCK_FILE: &str = "keepd.pid";

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub paths: Paths,
    pub machine: MachineId,
    /// Built-in defaults < `keep.toml` < environment.
    pub config: ConfigMap,
    pub tuning: Tuning,
    pub max_crawl_workers: Option<usize>,
    pub poll_interval: Option<Duration>,
    pub inherited_process: Option<ProcessId>,
}

impl Settings {
    /// Load settings from the environment and `keep.toml`.
    pub fn load() -> Result<Self, LifecycleError> {
        let data_dir = env::data_dir().ok_or(LifecycleError::NoDataDir)?;
        let mut settings = Self::at(&data_dir, std::env::vars())?;
        settings.paths = settings.paths.with_builtin_plugins(env::plugins_dir()).with_keep_bin(env::keep_bin());

        let defaults = Tuning::default();
        settings.tuning = Tuning {
            pid_reuse_window: env::pid_reuse_window().unwrap_or(defaults.pid_reuse_window),
            start_time_tolerance: env::start_time_tolerance().unwrap_or(defaults.start_time_tolerance),
            max_snapshot_workers: env::max_snapshot_workers().unwrap_or(defaults.max_snapshot_workers).max(1),
            ..defaults
        };
        settings.max_crawl_workers = env::max_crawl_workers();
        settings.poll_interval = env::poll_interval();
        settings.inherited_process = env::process_id();
        Ok(settings)
    }

    /// Settings rooted at `data_dir` with config overlaid from `vars`.
    /// Nothing else is read from the environment.
    pub fn at(
        data_dir: &Path,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, LifecycleError> {
        let machine = MachineId::current();
        let config_path = data_dir.join(CONFIG_FILE);
        let file = match std::fs::read_to_string(&config_path) {
            Ok(text) => ConfigMap::from_toml_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigMap::new(),
            Err(e) => return Err(e.into()),
        };
        let config = layered_config(&file, vars);
        Ok(Self {
            db_path: data_dir.join(DB_FILE),
            config_path,
            paths: Paths::under(data_dir, &machine),
            machine,
            config,
            tuning: Tuning::default(),
            max_crawl_workers: None,
            poll_interval: None,
            inherited_process: None,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.paths.data_dir
    }

    pub fn lock_path(&self) -> PathBuf {
        self.paths.logs_dir.join(LOCK_FILE)
    }

    /// Create the directory layout and open the datastore.
    pub fn open_store(&self) -> Result<Store, LifecycleError> {
        for dir in [&self.paths.archive_dir, &self.paths.crawls_dir, &self.paths.logs_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Store::open(&self.db_path)?)
    }

    pub fn engine_context(&self, store: Store) -> SystemContext {
        EngineContext::new(store, SystemProcessAdapter::new(), SystemClock, self.machine.clone(), self.paths.clone())
            .with_config(self.config.clone())
            .with_tuning(self.tuning.clone())
            .with_inherited_process(self.inherited_process.clone())
    }

    /// Orchestrator preset for the mode, with env overrides applied.
    pub fn orchestrator_config(&self, daemon: bool, scope: Option<CrawlId>) -> OrchestratorConfig {
        let mut config = if daemon { OrchestratorConfig::daemon() } else { OrchestratorConfig::foreground() };
        if let Some(max) = self.max_crawl_workers {
            config = config.with_max_crawl_workers(max);
        }
        if let Some(interval) = self.poll_interval {
            config = config.with_poll_interval(interval);
        }
        config.with_scope(scope)
    }
}

/// Keys every collection starts with.
pub fn default_config() -> ConfigMap {
    ConfigMap::new()
        .with("TIMEOUT", DEFAULT_HOOK_TIMEOUT.as_secs())
        .with("PLUGINS", "")
        .with("USER_AGENT", concat!("keep/", env!("CARGO_PKG_VERSION")))
        .with("CHECK_SSL_VALIDITY", true)
        .with("SAVE_ARCHIVE_DOT_ORG", false)
}

/// Merge defaults, the config file, and environment variables.
///
/// An environment variable overrides a key the defaults or file already
/// define, `PLUGINS`, and any `<PLUGIN>_ENABLED` / `<PLUGIN>_TIMEOUT` switch.
pub fn layered_config(file: &ConfigMap, vars: impl IntoIterator<Item = (String, String)>) -> ConfigMap {
    let mut config = ConfigMap::layered([&default_config(), file]);
    let overrides: ConfigMap = vars
        .into_iter()
        .filter(|(key, _)| {
            config.contains_key(key) || key.ends_with("_ENABLED") || key.ends_with("_TIMEOUT")
        })
        .map(|(key, value)| (key, value.into()))
        .collect();
    config.merge(&overrides);
    config
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
