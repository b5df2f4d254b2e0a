//! Runner configuration
//!
//! Loaded from a YAML file, then selectively overridden from environment
//! variables. The `register` command writes the issued runner token back into
//! the same file.

use anyhow::{Context, Result};
use gantry_core::domain::runner::RunnerIdentity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::BUILTIN_EXECUTORS;

/// Path appended to the configured server URL
const API_PATH: &str = "api/v4";

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub runner: RunnerConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// `runner` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Runner name, sent as the registration description
    pub name: String,

    /// Coordination server base URL (e.g., "https://gitlab.com/")
    pub url: String,

    /// Runner token, empty until `register` has been run
    #[serde(default)]
    pub token: String,

    /// Executor registry key
    #[serde(default = "default_executor")]
    pub executor: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Poll interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Maximum number of jobs running at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Base directory for per-job working directories
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    #[serde(default)]
    pub cleanup: CleanupPolicy,

    /// Timeout of a single HTTP call in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout: u64,

    /// Grace period for in-flight jobs on shutdown, in seconds
    #[serde(default = "default_timeout")]
    pub shutdown_timeout: u64,

    /// Container image for the podman executor
    #[serde(default = "default_image")]
    pub image: String,
}

/// What happens to a job working directory once the job is finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    Always,
    /// Keep directories of failed jobs for inspection
    #[default]
    OnSuccess,
    Never,
}

impl CleanupPolicy {
    pub fn should_remove(self, succeeded: bool) -> bool {
        match self {
            CleanupPolicy::Always => true,
            CleanupPolicy::OnSuccess => succeeded,
            CleanupPolicy::Never => false,
        }
    }
}

/// `log` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// Tracing filter directive for the runner crates
    ///
    /// Unknown levels fall back to `info`.
    pub fn filter_directive(&self) -> String {
        let level = match self.level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "warn" | "warning" => "warn",
            "error" => "error",
            _ => "info",
        };

        format!("gantry_runner={level},gantry_client={level}")
    }
}

fn default_executor() -> String {
    crate::executor::SHELL.to_string()
}

fn default_interval() -> u64 {
    10
}

fn default_concurrency() -> usize {
    1
}

fn default_workspace() -> PathBuf {
    std::env::temp_dir().join("gantry-builds")
}

fn default_timeout() -> u64 {
    30
}

// Clones run inside the container, so the image must ship git
fn default_image() -> String {
    "docker.io/alpine/git:latest".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Loads the configuration file and applies environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parses the configuration file without environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overrides file values with variables found by `lookup`
    ///
    /// Recognised variables:
    /// - GANTRY_RUNNER_NAME
    /// - GANTRY_URL
    /// - GANTRY_TOKEN
    /// - GANTRY_EXECUTOR
    /// - GANTRY_INTERVAL (seconds)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("GANTRY_RUNNER_NAME") {
            self.runner.name = name;
        }

        if let Some(url) = lookup("GANTRY_URL") {
            self.runner.url = url;
        }

        if let Some(token) = lookup("GANTRY_TOKEN") {
            self.runner.token = token;
        }

        if let Some(executor) = lookup("GANTRY_EXECUTOR") {
            self.runner.executor = executor;
        }

        if let Some(interval) = lookup("GANTRY_INTERVAL").and_then(|s| s.parse::<u64>().ok()) {
            self.runner.interval = interval;
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.runner.name.is_empty() {
            anyhow::bail!("runner.name cannot be empty");
        }

        if !self.runner.url.starts_with("http://") && !self.runner.url.starts_with("https://") {
            anyhow::bail!("runner.url must start with http:// or https://");
        }

        if self.runner.interval == 0 {
            anyhow::bail!("runner.interval must be greater than 0");
        }

        if self.runner.concurrency == 0 {
            anyhow::bail!("runner.concurrency must be greater than 0");
        }

        if !BUILTIN_EXECUTORS.contains(&self.runner.executor.as_str()) {
            anyhow::bail!(
                "runner.executor '{}' is not supported (expected one of: {})",
                self.runner.executor,
                BUILTIN_EXECUTORS.join(", ")
            );
        }

        Ok(())
    }

    /// Base URL of the coordination API
    pub fn api_url(&self) -> String {
        let base = self.runner.url.trim_end_matches('/');
        if base.ends_with(API_PATH) {
            base.to_string()
        } else {
            format!("{}/{}", base, API_PATH)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.runner.interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.runner.request_timeout)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.runner.shutdown_timeout)
    }

    /// Identity presented to the coordination server
    pub fn identity(&self) -> RunnerIdentity {
        RunnerIdentity {
            name: self.runner.name.clone(),
            url: self.api_url(),
            token: self.runner.token.clone(),
            executor: self.runner.executor.clone(),
            tags: self.runner.tags.clone(),
            poll_interval: self.poll_interval(),
        }
    }

    /// Stores a new runner token in the configuration file
    ///
    /// The file is re-read so environment overrides of the running process
    /// are not written back.
    pub fn persist_token(path: &Path, token: &str) -> Result<()> {
        let mut config = Self::from_file(path)?;
        config.runner.token = token.to_string();

        let contents =
            serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }
}
