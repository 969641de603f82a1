//! Tasks: configured rules that schedule a suite when their event fires.

use crate::branch_spec::BranchSpecs;
use crate::event::EventKeyword;
use buildwatch_core::ports::{DedupingScheduler, SuitePriority, SuiteRequest};
use buildwatch_core::{BranchBuilds, Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::{debug, error, info};

/// One task entry of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Human-readable name, e.g. `NightlyPower`. Not part of task identity.
    #[serde(default)]
    pub name: String,
    /// Suite to schedule, e.g. `bvt`.
    #[serde(default)]
    pub suite: String,
    /// Keyword of the event this task subscribes to.
    #[serde(default)]
    pub run_on: String,
    /// Branches to take builds from; empty means every numbered branch.
    #[serde(default)]
    pub branch_specs: Vec<String>,
    /// Device pool to run on.
    #[serde(default)]
    pub pool: Option<String>,
    /// Number of devices to shard the suite across.
    #[serde(default)]
    pub num: Option<u32>,
    /// Boards to run on; empty means every board.
    #[serde(default)]
    pub boards: Vec<String>,
    #[serde(default)]
    pub file_bugs: bool,
    /// Run once, then unsubscribe.
    #[serde(default)]
    pub one_shot: bool,
}

/// Everything that makes two tasks the same task.
///
/// The display name is deliberately absent: two entries that would schedule
/// identical suites collapse into one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey {
    pub suite: String,
    pub run_on: String,
    pub branch_specs: Vec<String>,
    pub pool: Option<String>,
    pub num: Option<u32>,
    pub boards: BTreeSet<String>,
    pub priority: Option<SuitePriority>,
    pub timeout_hours: Option<u32>,
    pub file_bugs: bool,
    pub one_shot: bool,
}

/// A suite-trigger rule bound to an event.
#[derive(Debug, Clone)]
pub struct Task {
    name: String,
    key: TaskKey,
    specs: BranchSpecs,
}

impl Task {
    /// Build a task from its configuration entry.
    ///
    /// `tot` is the tip-of-tree milestone used to resolve `tot` branch specs.
    pub fn from_config(config: TaskConfig, tot: Option<u32>) -> Result<Self> {
        let name = config.name;
        if config.run_on.trim().is_empty() {
            return Err(Error::MalformedConfig(format!("task {name}: no event to run_on")));
        }
        if config.suite.trim().is_empty() {
            return Err(Error::MalformedConfig(format!("task {name}: no suite")));
        }
        let specs = BranchSpecs::parse(&config.branch_specs, tot)
            .map_err(|e| Error::MalformedConfig(format!("task {name}: {e}")))?;

        let keyword = config.run_on.parse::<EventKeyword>().ok();
        let key = TaskKey {
            suite: config.suite,
            run_on: config.run_on,
            branch_specs: config.branch_specs,
            pool: config.pool,
            num: config.num,
            boards: config.boards.into_iter().map(|b| b.trim().to_string()).collect(),
            priority: keyword.map(EventKeyword::priority),
            timeout_hours: keyword.map(EventKeyword::timeout_hours),
            file_bugs: config.file_bugs,
            one_shot: config.one_shot,
        };

        Ok(Self { name, key, specs })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    /// Keyword of the event this task subscribes to.
    pub fn run_on(&self) -> &str {
        &self.key.run_on
    }

    pub fn is_one_shot(&self) -> bool {
        self.key.one_shot
    }

    /// Whether this task runs on `board`.
    pub fn targets(&self, board: &str) -> bool {
        self.key.boards.is_empty() || self.key.boards.contains(board)
    }

    /// Whether builds from `branch` are wanted by this task.
    pub fn fits_spec(&self, branch: &str) -> bool {
        self.specs.fits(branch)
    }

    fn request(&self, build: &str, board: &str, force: bool) -> SuiteRequest {
        SuiteRequest {
            suite: self.key.suite.clone(),
            build: build.to_string(),
            board: board.to_string(),
            pool: self.key.pool.clone(),
            num: self.key.num,
            priority: self.key.priority,
            timeout_hours: self.key.timeout_hours,
            file_bugs: self.key.file_bugs,
            force,
        }
    }

    /// Schedule this task's suite on `board` for every fitting build.
    ///
    /// Returns whether the task stays subscribed: `Ok(false)` only for a
    /// one-shot task that ran for a board it targets. A scheduling failure
    /// for one build does not stop the others; only when every attempt fails
    /// is the run an error.
    pub async fn run(
        &self,
        scheduler: &dyn DedupingScheduler,
        branch_builds: &BranchBuilds,
        board: &str,
        force: bool,
    ) -> Result<bool> {
        if !self.targets(board) {
            debug!(task = %self.name, board, "Board not targeted, skipping");
            return Ok(true);
        }

        info!(task = %self.name, board, "Running task");
        let builds: Vec<&String> = branch_builds
            .iter()
            .filter(|(branch, _)| {
                let fits = self.fits_spec(branch);
                debug!(task = %self.name, branch = %branch, fits, "Checked branch against specs");
                fits
            })
            .flat_map(|(_, builds)| builds)
            .collect();

        let mut failures = 0;
        for build in &builds {
            let request = self.request(build, board, force);
            match scheduler.schedule_suite(&request).await {
                Ok(true) => {
                    info!(task = %self.name, suite = %self.key.suite, build = %build, board, "Scheduled suite");
                }
                Ok(false) => {
                    info!(task = %self.name, suite = %self.key.suite, build = %build, board, "Skipping duplicate suite");
                }
                Err(e) => {
                    error!(task = %self.name, suite = %self.key.suite, build = %build, board, error = %e, "Failed to schedule suite");
                    failures += 1;
                }
            }
        }

        if failures > 0 && failures == builds.len() {
            return Err(Error::Schedule(format!(
                "{} on {}: all {} attempts failed",
                self.key.suite, board, failures
            )));
        }

        Ok(!self.key.one_shot)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.key.one_shot { "OneShotTask" } else { "Task" };
        write!(f, "{}: {} on {:?} with pool ", kind, self.key.suite, self.key.branch_specs)?;
        match &self.key.pool {
            Some(pool) => write!(f, "{}", pool)?,
            None => write!(f, "[Default pool]")?,
        }
        if self.key.boards.is_empty() {
            write!(f, ", boards [All boards]")?;
        } else {
            let boards: Vec<&str> = self.key.boards.iter().map(String::as_str).collect();
            write!(f, ", boards [{}]", boards.join(","))?;
        }
        write!(f, ", file_bugs = {} across ", self.key.file_bugs)?;
        match self.key.num {
            Some(num) => write!(f, "{} machines.", num),
            None => write!(f, "[Default num] machines."),
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
