// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered key/value configuration handed to hooks.
//!
//! Layers merge left to right (defaults, `keep.toml`, environment, crawl,
//! snapshot); later layers win per key. Hooks receive the merged map
//! flattened into environment variables.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Fallback for `TIMEOUT` when neither the plugin nor the global key is set.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config must be a table of keys: {0}")]
    Shape(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigMap(BTreeMap<String, Value>);

/// Resolved `<PLUGIN>_*` special keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub enabled: bool,
    pub timeout: Duration,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(text)?;
        let value = serde_json::to_value(table)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Overlay `other` onto `self`; keys in `other` win.
    pub fn merge(&mut self, other: &ConfigMap) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Merge several layers in order into a fresh map.
    pub fn layered<'a>(layers: impl IntoIterator<Item = &'a ConfigMap>) -> ConfigMap {
        let mut merged = ConfigMap::new();
        for layer in layers {
            merged.merge(layer);
        }
        merged
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Booleans accept JSON bools, numbers, and the strings users put in env vars.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.as_f64().unwrap_or(0.0) != 0.0),
            Value::String(s) => Some(!matches!(s.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no" | "")),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Enabled flag and timeout for a plugin.
    ///
    /// A non-empty `PLUGINS` whitelist disables everything not listed; a listed
    /// plugin can still be switched off by `<PLUGIN>_ENABLED`.
    pub fn plugin(&self, plugin: &str) -> PluginConfig {
        let upper = plugin.to_ascii_uppercase();
        let whitelisted = match self.get_str("PLUGINS").filter(|s| !s.trim().is_empty()) {
            Some(list) => list.split(',').map(|p| p.trim().to_ascii_lowercase()).any(|p| p == plugin.to_ascii_lowercase()),
            None => true,
        };
        let enabled = whitelisted && self.get_bool(&format!("{upper}_ENABLED")).unwrap_or(true);
        let timeout = self
            .get_u64(&format!("{upper}_TIMEOUT"))
            .filter(|t| *t > 0)
            .or_else(|| self.get_u64("TIMEOUT"))
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HOOK_TIMEOUT);
        PluginConfig { enabled, timeout }
    }

    /// Flatten into `KEY=value` pairs for a child environment.
    ///
    /// Strings pass through, bools become `true`/`false`, numbers use their
    /// JSON form, and arrays/objects are JSON-encoded. Nulls are skipped.
    pub fn to_env(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter_map(|(k, v)| {
                let flat = match v {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    other => other.to_string(),
                };
                Some((k.clone(), flat))
            })
            .collect()
    }
}

impl FromIterator<(String, Value)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
