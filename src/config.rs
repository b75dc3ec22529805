use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::RetryPolicy;

/// Environment variable that points at an explicit config file
pub const CONFIG_ENV: &str = "WORKFLOW_RECORDER_CONFIG";

/// Settings for tab-query retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TabQueryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for TabQueryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 100,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Script path registered into tabs on demand
    pub recorder_script: String,
    /// Wait between injecting the recorder and sending it the first command
    pub settle_delay_ms: u64,
    /// Upper bound on one message round trip
    pub message_timeout_ms: u64,
    /// How long a freshly injected scope takes to attach its listener
    pub listener_attach_delay_ms: u64,
    /// Default log filter, overridden by RUST_LOG
    pub log_level: String,
    pub tab_query: TabQueryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recorder_script: "content/recorder.js".to_string(),
            settle_delay_ms: 100,
            message_timeout_ms: 5000,
            listener_attach_delay_ms: 50,
            log_level: "info".to_string(),
            tab_query: TabQueryConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location (~/.config/workflow-recorder/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("workflow-recorder").join("config.toml"))
    }

    /// Load from `$WORKFLOW_RECORDER_CONFIG` or the default path; a missing file yields defaults
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(Self::default_path);

        match path {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if config.tab_query.max_attempts == 0 {
            anyhow::bail!("tab-query.max-attempts must be at least 1");
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.tab_query.max_attempts,
            backoff: Duration::from_millis(self.tab_query.backoff_ms),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
