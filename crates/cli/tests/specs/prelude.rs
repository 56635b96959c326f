// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers: a throwaway data directory and a fluent wrapper around
//! the `keep` binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use assert_cmd::Command;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Upper bound for a foreground `keep run` to drain its queues.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(60);

/// Crawl hook that emits nothing.
pub const NOOP_HOOK: &str = "#!/usr/bin/env bash\nexit 0\n";

/// Snapshot hook that saves the URL it was given and reports success.
pub const SAVE_URL_HOOK: &str = r#"#!/usr/bin/env bash
for arg in "$@"; do
  case "$arg" in --url=*) url="${arg#--url=}" ;; esac
done
echo "$url" > saved.txt
echo '{"type":"ArchiveResult","status":"succeeded","output_str":"saved.txt"}'
"#;

fn keep_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_keep"))
}

/// `keep` with no data directory prepared.
pub fn cli() -> CliBuilder {
    CliBuilder::new(None)
}

pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn empty() -> Self {
        Self { dir: tempfile::tempdir().unwrap() }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `rel` under the data directory.
    pub fn file(&self, rel: &str, content: &str) {
        let path = self.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Install a hook under `plugins/<plugin>/`.
    pub fn hook(&self, plugin: &str, name: &str, script: &str) {
        self.file(&format!("plugins/{plugin}/{name}"), script);
    }

    pub fn keep(&self) -> CliBuilder {
        CliBuilder::new(Some(self.path()))
    }

    /// Queue a crawl and return its id.
    pub fn add_crawl(&self, args: &[&str]) -> String {
        let mut full = vec!["crawl", "add"];
        full.extend_from_slice(args);
        self.keep().args(&full).passes().stdout().trim().to_string()
    }

    pub fn status_json(&self) -> serde_json::Value {
        let out = self.keep().args(&["status", "--format", "json"]).passes().stdout();
        serde_json::from_str(&out).unwrap()
    }

    /// Count of `kind` jobs in `status`, from `keep status`.
    pub fn job_count(&self, kind: &str, status: &str) -> u64 {
        let report = self.status_json();
        let jobs = report["jobs"].as_array().unwrap();
        let job = jobs.iter().find(|j| j["kind"] == kind).unwrap();
        job["statuses"]
            .as_array()
            .unwrap()
            .iter()
            .find(|pair| pair[0] == status)
            .map(|pair| pair[1].as_u64().unwrap())
            .unwrap_or(0)
    }

    /// Files named `name` anywhere under `archive/`.
    pub fn archived(&self, name: &str) -> Vec<PathBuf> {
        WalkDir::new(self.path().join("archive"))
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && e.file_name() == name)
            .map(|e| e.into_path())
            .collect()
    }
}

pub struct CliBuilder {
    cmd: Command,
}

impl CliBuilder {
    fn new(data_dir: Option<&Path>) -> Self {
        let mut cmd = Command::new(keep_bin());
        for var in ["KEEP_PLUGINS_DIR", "KEEP_PROCESS_ID", "KEEP_MAX_CRAWL_WORKERS", "PLUGINS"] {
            cmd.env_remove(var);
        }
        cmd.env("NO_COLOR", "1").env("KEEP_BIN", keep_bin()).env("KEEP_POLL_INTERVAL_MS", "50");
        match data_dir {
            Some(dir) => {
                cmd.env("KEEP_DATA_DIR", dir).current_dir(dir);
            }
            None => {
                cmd.env_remove("KEEP_DATA_DIR");
            }
        }
        cmd.timeout(RUN_TIMEOUT);
        Self { cmd }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.cmd.env(key, value);
        self
    }

    /// Run and require exit 0.
    pub fn passes(mut self) -> RunAssert {
        let output = self.cmd.output().unwrap();
        let run = RunAssert::from(output);
        assert_eq!(run.code, Some(0), "expected success\nstdout:\n{}\nstderr:\n{}", run.stdout, run.stderr);
        run
    }

    /// Run and require a non-zero exit.
    pub fn fails(mut self) -> RunAssert {
        let output = self.cmd.output().unwrap();
        let run = RunAssert::from(output);
        assert_ne!(run.code, Some(0), "expected failure\nstdout:\n{}", run.stdout);
        run
    }
}

pub struct RunAssert {
    pub code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl From<std::process::Output> for RunAssert {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        self.stdout.clone()
    }

    pub fn stdout_has(self, needle: &str) -> Self {
        assert!(self.stdout.contains(needle), "stdout missing {needle:?}:\n{}", self.stdout);
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        assert!(self.stderr.contains(needle), "stderr missing {needle:?}:\n{}", self.stderr);
        self
    }

    pub fn stdout_eq(self, expected: &str) -> Self {
        similar_asserts::assert_eq!(self.stdout, expected);
        self
    }

    pub fn code_is(self, code: i32) -> Self {
        assert_eq!(self.code, Some(code), "stderr:\n{}", self.stderr);
        self
    }
}
