//! Scheduler configuration: poll cadence, boards, events and tasks.

use crate::task::TaskConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of the driver and everything it dispatches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between polls of the history.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Upper bound on one task run.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    /// Boards to poll for.
    #[serde(default)]
    pub boards: Vec<String>,
    /// Tip-of-tree milestone, needed by `tot` branch specs.
    #[serde(default)]
    pub tot_milestone: Option<u32>,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

/// Settings of the timed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default)]
    pub nightly: NightlyConfig,
    #[serde(default)]
    pub weekly: WeeklyConfig,
    /// Days timed events look back for the latest build. Each event always
    /// covers at least its own period.
    #[serde(default)]
    pub lookback_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightlyConfig {
    /// Local hour, 0-23.
    #[serde(default = "default_nightly_hour")]
    pub hour: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyConfig {
    /// Day of the week, 0 = Monday.
    #[serde(default = "default_weekly_day")]
    pub day: u32,
    /// Local hour, 0-23.
    #[serde(default = "default_weekly_hour")]
    pub hour: u32,
}

fn default_poll_interval() -> u64 {
    300
}

fn default_dispatch_timeout() -> u64 {
    600
}

fn default_nightly_hour() -> u32 {
    21
}

fn default_weekly_day() -> u32 {
    5
}

fn default_weekly_hour() -> u32 {
    23
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            boards: vec![],
            tot_milestone: None,
            events: EventsConfig::default(),
            tasks: vec![],
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            nightly: NightlyConfig::default(),
            weekly: WeeklyConfig::default(),
            lookback_days: None,
        }
    }
}

impl Default for NightlyConfig {
    fn default() -> Self {
        Self {
            hour: default_nightly_hour(),
        }
    }
}

impl Default for WeeklyConfig {
    fn default() -> Self {
        Self {
            day: default_weekly_day(),
            hour: default_weekly_hour(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}
