//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the scheduling core and its
//! external collaborators: the manifest history, the suite-submission
//! service, and the source of boards to poll.

use crate::branch::BranchManifests;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference into the manifest history (a git commit hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(String);

impl Checkpoint {
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which part of the history a discovery query looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryWindow {
    /// Everything committed after the checkpoint.
    SinceCheckpoint(Checkpoint),
    /// Everything committed in the last N days, for runs with no checkpoint.
    SinceDays(u32),
}

impl fmt::Display for HistoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryWindow::SinceCheckpoint(c) => write!(f, "{}..HEAD", c),
            HistoryWindow::SinceDays(days) => write!(f, "last {} days", days),
        }
    }
}

/// History of successful-build manifests.
#[async_trait]
pub trait VersionHistory: Send + Sync {
    /// Set up the local copy of the history. Must succeed before any query.
    async fn initialize(&self) -> Result<()>;

    /// Pull newly committed history. Never moves any caller's checkpoint.
    async fn update(&self) -> Result<()>;

    /// The newest point of the history as currently known.
    async fn current_checkpoint(&self) -> Result<Checkpoint>;

    /// Whether any build, for any board, landed after `checkpoint`.
    async fn any_new_since(&self, checkpoint: &Checkpoint) -> Result<bool>;

    /// Manifests for `board` added within `window`, grouped by branch.
    async fn manifests_since(&self, window: &HistoryWindow, board: &str)
    -> Result<BranchManifests>;

    /// Manifests for `board` added after `checkpoint`.
    async fn manifests_since_rev(
        &self,
        checkpoint: &Checkpoint,
        board: &str,
    ) -> Result<BranchManifests> {
        self.manifests_since(&HistoryWindow::SinceCheckpoint(checkpoint.clone()), board)
            .await
    }

    /// Manifests for `board` added in the last `days` days.
    async fn manifests_since_days(&self, days: u32, board: &str) -> Result<BranchManifests> {
        self.manifests_since(&HistoryWindow::SinceDays(days), board)
            .await
    }
}

/// Priority a suite is scheduled with, set by the kind of event that fired it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuitePriority {
    Weekly,
    Daily,
    PostBuild,
}

impl fmt::Display for SuitePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuitePriority::Weekly => write!(f, "weekly"),
            SuitePriority::Daily => write!(f, "daily"),
            SuitePriority::PostBuild => write!(f, "post_build"),
        }
    }
}

/// A request to run one suite against one build on one board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteRequest {
    pub suite: String,
    pub build: String,
    pub board: String,
    pub pool: Option<String>,
    /// Number of devices to shard across; `None` lets the service decide.
    pub num: Option<u32>,
    pub priority: Option<SuitePriority>,
    pub timeout_hours: Option<u32>,
    pub file_bugs: bool,
    /// Schedule even if an identical suite is already live.
    pub force: bool,
}

/// Suite-submission service with at-most-once semantics per
/// (suite, build, board, pool).
#[async_trait]
pub trait DedupingScheduler: Send + Sync {
    /// Submit a suite run. `Ok(false)` means an identical run already exists
    /// and nothing was scheduled.
    async fn schedule_suite(&self, request: &SuiteRequest) -> Result<bool>;
}

/// Source of the boards the driver polls for.
#[async_trait]
pub trait BoardEnumerator: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<String>>;
}
