//! Configuration file loading.

use buildwatch_core::Result;
use buildwatch_history::HistoryConfig;
use buildwatch_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of `buildwatch.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildwatchConfig {
    /// Where the manifest history lives.
    pub history: HistoryConfig,
    #[serde(flatten)]
    pub scheduler: SchedulerConfig,
}

impl BuildwatchConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }
}
