//! Configuration management for the snapshot engine.
//!
//! Loads configuration from a TOML file; the binary layers CLI overrides
//! on top.

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub job: JobConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Configuration for one backup/restore job slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Directory tree to snapshot.
    pub source_path: PathBuf,

    /// Directory receiving snapshot archives.
    pub destination_path: PathBuf,

    /// Seconds between automatic snapshot attempts (default: one hour).
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// zstd compression level (1-22).
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Entry names to skip while walking the source tree.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Delete the partial archive left behind when a snapshot is stopped
    /// mid-write. A kept partial is still readable up to its last entry.
    #[serde(default = "default_remove_partial")]
    pub remove_partial_on_stop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_tick_interval_secs() -> u64 {
    3600 // 1 hour
}

fn default_compression_level() -> i32 {
    3
}

fn default_remove_partial() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl JobConfig {
    pub fn new(source_path: impl Into<PathBuf>, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            tick_interval_secs: default_tick_interval_secs(),
            compression_level: default_compression_level(),
            exclude_patterns: Vec::new(),
            remove_partial_on_stop: default_remove_partial(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Reject configurations that cannot produce a snapshot. Checked before
    /// any worker is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.source_path.as_os_str().is_empty() {
            return Err(EngineError::Config("source path is not set".to_string()));
        }
        if self.destination_path.as_os_str().is_empty() {
            return Err(EngineError::Config(
                "destination path is not set".to_string(),
            ));
        }
        if self.source_path.file_name().is_none() {
            return Err(EngineError::Config(format!(
                "source path {} has no directory name",
                self.source_path.display()
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Create a configuration with empty paths; the caller fills them in
    /// from CLI flags before validation.
    pub fn default() -> Self {
        Config {
            job: JobConfig::new("", ""),
            log: LogConfig::default(),
        }
    }
}
