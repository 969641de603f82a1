//! Configuration for the manifest history.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the git-backed manifest history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// URL of the manifest-versions repository.
    pub url: String,
    /// Where to keep the clone. A scratch directory is used when unset.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// git executable.
    #[serde(default = "default_git_binary")]
    pub git_binary: PathBuf,
    /// Upper bound on any single git invocation.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Clone attempts before `initialize` gives up.
    #[serde(default = "default_clone_attempts")]
    pub clone_attempts: u32,
    /// Wait between clone attempts.
    #[serde(default = "default_clone_retry_delay")]
    pub clone_retry_delay_secs: u64,
}

fn default_git_binary() -> PathBuf {
    PathBuf::from("git")
}

fn default_command_timeout() -> u64 {
    600
}

fn default_clone_attempts() -> u32 {
    13 // an hour of retries at the default delay
}

fn default_clone_retry_delay() -> u64 {
    300
}

impl HistoryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            workdir: None,
            git_binary: default_git_binary(),
            command_timeout_secs: default_command_timeout(),
            clone_attempts: default_clone_attempts(),
            clone_retry_delay_secs: default_clone_retry_delay(),
        }
    }

    /// Keep the clone at a fixed path instead of a scratch directory.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Set clone retry behaviour.
    pub fn with_clone_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.clone_attempts = attempts;
        self.clone_retry_delay_secs = delay.as_secs();
        self
    }

    /// Set the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs();
        self
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn clone_retry_delay(&self) -> Duration {
        Duration::from_secs(self.clone_retry_delay_secs)
    }
}
