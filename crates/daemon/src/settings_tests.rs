// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use tempfile::tempdir;

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn paths_live_under_data_dir() {
    let dir = tempdir().unwrap();
    let settings = Settings::at(dir.path(), vars(&[])).unwrap();

    assert_eq!(settings.db_path, dir.path().join("index.sqlite3"));
    assert_eq!(settings.config_path, dir.path().join("keep.toml"));
    assert_eq!(settings.paths.plugin_dirs, vec![dir.path().join("plugins")]);
    assert_eq!(settings.lock_path(), dir.path().join("logs").join("keepd.pid"));
}

#[test]
fn missing_config_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let settings = Settings::at(dir.path(), vars(&[])).unwrap();
    assert_eq!(settings.config, default_config());
    assert_eq!(settings.config.plugin("wget").timeout, DEFAULT_HOOK_TIMEOUT);
}

#[test]
fn file_overrides_defaults_and_env_overrides_file() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("keep.toml"), "TIMEOUT = 30\nWGET_TIMEOUT = 90\nCOOKIES_FILE = \"/tmp/c.txt\"\n").unwrap();

    let settings = Settings::at(
        dir.path(),
        vars(&[("WGET_TIMEOUT", "15"), ("COOKIES_FILE", "/srv/c.txt"), ("HOME", "/root"), ("CHROME_ENABLED", "false")]),
    )
    .unwrap();

    assert_eq!(settings.config.plugin("wget").timeout, Duration::from_secs(15));
    assert_eq!(settings.config.plugin("title").timeout, Duration::from_secs(30));
    assert_eq!(settings.config.get_str("COOKIES_FILE").as_deref(), Some("/srv/c.txt"));
    assert!(!settings.config.plugin("chrome").enabled);
    assert!(!settings.config.contains_key("HOME"), "unrelated env vars stay out");
}

#[test]
fn plugins_whitelist_comes_from_env() {
    let config = layered_config(&ConfigMap::new(), vars(&[("PLUGINS", "wget,title")]));
    assert!(config.plugin("wget").enabled);
    assert!(!config.plugin("chrome").enabled);
}

#[test]
fn invalid_config_file_is_an_error() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("keep.toml"), "TIMEOUT = [").unwrap();
    assert!(matches!(Settings::at(dir.path(), vars(&[])), Err(LifecycleError::Config(_))));
}

#[yare::parameterized(
    daemon     = { true, Duration::from_secs(2), 8 },
    foreground = { false, Duration::from_millis(250), 1 },
)]
fn orchestrator_presets(daemon: bool, poll: Duration, max: usize) {
    let dir = tempdir().unwrap();
    let settings = Settings::at(dir.path(), vars(&[])).unwrap();
    let config = settings.orchestrator_config(daemon, None);
    assert_eq!(config.daemon, daemon);
    assert_eq!(config.poll_interval, poll);
    assert_eq!(config.max_crawl_workers, max);
}

#[test]
fn orchestrator_overrides_and_scope() {
    let dir = tempdir().unwrap();
    let mut settings = Settings::at(dir.path(), vars(&[])).unwrap();
    settings.max_crawl_workers = Some(3);
    settings.poll_interval = Some(Duration::from_millis(50));

    let scope = CrawlId::new();
    let config = settings.orchestrator_config(false, Some(scope.clone()));
    assert_eq!(config.max_crawl_workers, 3);
    assert_eq!(config.poll_interval, Duration::from_millis(50));
    assert_eq!(config.scope, Some(scope));
}

#[test]
fn open_store_creates_layout() {
    let dir = tempdir().unwrap();
    let settings = Settings::at(&dir.path().join("data"), vars(&[])).unwrap();
    settings.open_store().unwrap();

    assert!(settings.db_path.exists());
    assert!(settings.paths.archive_dir.is_dir());
    assert!(settings.paths.logs_dir.is_dir());
}

#[test]
#[serial]
fn load_reads_keep_env() {
    let dir = tempdir().unwrap();
    std::env::set_var("KEEP_DATA_DIR", dir.path());
    std::env::set_var("KEEP_PLUGINS_DIR", "/opt/keep/plugins");
    std::env::set_var("KEEP_MAX_SNAPSHOT_WORKERS", "2");
    std::env::set_var("KEEP_PROCESS_ID", "prc-parent");

    let settings = Settings::load().unwrap();

    std::env::remove_var("KEEP_DATA_DIR");
    std::env::remove_var("KEEP_PLUGINS_DIR");
    std::env::remove_var("KEEP_MAX_SNAPSHOT_WORKERS");
    std::env::remove_var("KEEP_PROCESS_ID");

    assert_eq!(settings.data_dir(), dir.path());
    assert_eq!(settings.paths.plugin_dirs[0], PathBuf::from("/opt/keep/plugins"));
    assert_eq!(settings.tuning.max_snapshot_workers, 2);
    assert_eq!(settings.inherited_process, Some(ProcessId::from_string("prc-parent")));
}
