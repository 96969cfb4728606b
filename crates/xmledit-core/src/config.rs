//! Session configuration.
//!
//! Configuration is a JSON document. Every field has a default, so `{}` is a valid file:
//!
//! ```json
//! {
//!   "schema": "data/classdef.xml",
//!   "metadata": "data/modules.json",
//!   "coordinator": { "warmup_ms": 1000, "interval_ms": 200 },
//!   "sync": { "retry_enclosing": false, "indent": "\t" }
//! }
//! ```
//!
//! Relative paths are resolved against the directory of the configuration file by
//! [`XmlEditConfig::from_path`].

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
/// Errors produced while loading configuration.
pub enum ConfigError {
    #[error("I/O error: {0}")]
    /// The file could not be read.
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    /// The file is not valid configuration JSON.
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Timing of the selection coordinator worker.
pub struct CoordinatorConfig {
    /// Delay before the first tick, in milliseconds.
    pub warmup_ms: u64,
    /// Interval between ticks, in milliseconds.
    pub interval_ms: u64,
}

impl CoordinatorConfig {
    /// Warm-up delay.
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// Tick interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 1000,
            interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Behavior of the synchronization engine.
pub struct SyncConfig {
    /// When the caret line holds an unknown or non-selectable element, select the
    /// nearest enclosing selectable element instead of clearing the selection.
    pub retry_enclosing: bool,
    /// One level of indentation for inserted elements.
    pub indent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_enclosing: false,
            indent: "\t".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Top-level configuration.
pub struct XmlEditConfig {
    /// Schema (class definition) file.
    pub schema: Option<PathBuf>,
    /// Module metadata catalog file.
    pub metadata: Option<PathBuf>,
    /// Coordinator timing.
    pub coordinator: CoordinatorConfig,
    /// Engine behavior.
    pub sync: SyncConfig,
}

impl XmlEditConfig {
    /// Parse configuration JSON. Paths are kept as written.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file, resolving relative paths against its directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, dir: &Path) {
        for path in [&mut self.schema, &mut self.metadata].into_iter().flatten() {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
    }
}
