//! Events: trigger sources that decide when to poll and what changed.
//!
//! An event owns a deduplicated set of tasks. The driver asks it whether it
//! should handle this cycle, which builds are relevant per board, then has it
//! dispatch those builds to its tasks. A task that asks to be retired is
//! dropped from the set once the dispatch loop is over.

use crate::task::Task;
use buildwatch_core::ports::{Checkpoint, DedupingScheduler, SuitePriority, VersionHistory};
use buildwatch_core::{BranchBuilds, BranchManifests, Error, Result, build_name};
use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Keywords tasks use in `run_on` to subscribe to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKeyword {
    NewBuild,
    Nightly,
    Weekly,
}

impl EventKeyword {
    pub const ALL: [EventKeyword; 3] = [
        EventKeyword::NewBuild,
        EventKeyword::Nightly,
        EventKeyword::Weekly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKeyword::NewBuild => "new_build",
            EventKeyword::Nightly => "nightly",
            EventKeyword::Weekly => "weekly",
        }
    }

    /// Priority of suites scheduled in response to this event.
    pub fn priority(self) -> SuitePriority {
        match self {
            EventKeyword::NewBuild => SuitePriority::PostBuild,
            EventKeyword::Nightly => SuitePriority::Daily,
            EventKeyword::Weekly => SuitePriority::Weekly,
        }
    }

    /// Lifetime, in hours, of suites scheduled in response to this event.
    pub fn timeout_hours(self) -> u32 {
        match self {
            EventKeyword::NewBuild => 12,
            EventKeyword::Nightly => 24,
            EventKeyword::Weekly => 24 * 7,
        }
    }
}

impl fmt::Display for EventKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKeyword {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EventKeyword::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::MalformedConfig(format!("unknown event: {s}")))
    }
}

/// Trigger state, per kind of event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Fires whenever any build lands after the checkpoint.
    NewBuild { checkpoint: Option<Checkpoint> },
    /// Fires once a day at `hour` local time.
    Nightly { hour: u32, deadline: NaiveDateTime },
    /// Fires once a week on `day` (0 = Monday) at `hour` local time.
    Weekly {
        day: u32,
        hour: u32,
        deadline: NaiveDateTime,
    },
}

/// Outcome of dispatching one board's builds to an event's tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleReport {
    /// Tasks whose run completed, retiring ones included.
    pub ran: usize,
    /// One-shot tasks removed after running.
    pub retired: usize,
    /// Tasks whose run errored or timed out. These stay subscribed.
    pub failed: usize,
}

/// A named trigger source and the tasks subscribed to it.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    tasks: BTreeSet<Task>,
    dispatch_timeout: Duration,
    lookback_days: Option<u32>,
}

const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(600);

impl Event {
    fn with_kind(kind: EventKind, tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            kind,
            tasks: tasks.into_iter().collect(),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            lookback_days: None,
        }
    }

    /// Event firing on newly landed builds. Must be [`prepare`d](Self::prepare)
    /// before it can be polled.
    pub fn new_build(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self::with_kind(EventKind::NewBuild { checkpoint: None }, tasks)
    }

    /// Daily event at `hour`, first due at the next such hour from now.
    pub fn nightly(hour: u32, tasks: impl IntoIterator<Item = Task>) -> Result<Self> {
        Self::nightly_at(hour, now(), tasks)
    }

    pub fn nightly_at(
        hour: u32,
        now: NaiveDateTime,
        tasks: impl IntoIterator<Item = Task>,
    ) -> Result<Self> {
        let deadline = first_deadline(now, None, hour)?;
        Ok(Self::with_kind(EventKind::Nightly { hour, deadline }, tasks))
    }

    /// Weekly event on `day` (0 = Monday) at `hour`.
    pub fn weekly(day: u32, hour: u32, tasks: impl IntoIterator<Item = Task>) -> Result<Self> {
        Self::weekly_at(day, hour, now(), tasks)
    }

    pub fn weekly_at(
        day: u32,
        hour: u32,
        now: NaiveDateTime,
        tasks: impl IntoIterator<Item = Task>,
    ) -> Result<Self> {
        let deadline = first_deadline(now, Some(day), hour)?;
        Ok(Self::with_kind(
            EventKind::Weekly {
                day,
                hour,
                deadline,
            },
            tasks,
        ))
    }

    /// Bound on a single task's run during [`handle`](Self::handle).
    pub fn with_dispatch_timeout(mut self, dispatch_timeout: Duration) -> Self {
        self.dispatch_timeout = dispatch_timeout;
        self
    }

    /// Widen how far back a timed event looks for the latest builds. The
    /// window never shrinks below the event's own period.
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = Some(days);
        self
    }

    /// Days of history a timed event considers: its period, or the
    /// configured lookback when that is longer.
    pub fn lookback_days(&self) -> u32 {
        let period = match self.kind {
            EventKind::NewBuild { .. } | EventKind::Nightly { .. } => 1,
            EventKind::Weekly { .. } => 7,
        };
        self.lookback_days.map_or(period, |days| days.max(period))
    }

    pub fn keyword(&self) -> EventKeyword {
        match self.kind {
            EventKind::NewBuild { .. } => EventKeyword::NewBuild,
            EventKind::Nightly { .. } => EventKeyword::Nightly,
            EventKind::Weekly { .. } => EventKeyword::Weekly,
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Subscribe `task`. Returns false if an identical task was already there.
    pub fn add_task(&mut self, task: Task) -> bool {
        self.tasks.insert(task)
    }

    /// When a timed event is next due.
    pub fn deadline(&self) -> Option<NaiveDateTime> {
        match self.kind {
            EventKind::NewBuild { .. } => None,
            EventKind::Nightly { deadline, .. } | EventKind::Weekly { deadline, .. } => {
                Some(deadline)
            }
        }
    }

    /// Capture the starting point in the history. Timed events need nothing.
    pub async fn prepare(&mut self, history: &dyn VersionHistory) -> Result<()> {
        if let EventKind::NewBuild { checkpoint } = &mut self.kind {
            let current = history.current_checkpoint().await?;
            info!(event = %EventKeyword::NewBuild, checkpoint = %current, "Prepared event");
            *checkpoint = Some(current);
        }
        Ok(())
    }

    /// Whether this event has anything to do this cycle.
    pub async fn should_handle(&self, history: &dyn VersionHistory) -> Result<bool> {
        match &self.kind {
            EventKind::NewBuild { checkpoint } => {
                let checkpoint = self.require_checkpoint(checkpoint)?;
                history.any_new_since(checkpoint).await
            }
            _ => Ok(self.is_due_at(now())),
        }
    }

    /// Whether a timed event's deadline has been reached at `now`.
    pub fn is_due_at(&self, now: NaiveDateTime) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Builds relevant to this event for `board`, keyed by branch name.
    ///
    /// New-build events return every build since the checkpoint; timed
    /// events return the newest build per branch within
    /// [`lookback_days`](Self::lookback_days).
    pub async fn get_branch_builds_for_board(
        &self,
        board: &str,
        history: &dyn VersionHistory,
    ) -> Result<BranchBuilds> {
        match &self.kind {
            EventKind::NewBuild { checkpoint } => {
                let checkpoint = self.require_checkpoint(checkpoint)?;
                let manifests = history.manifests_since_rev(checkpoint, board).await?;
                Ok(render_builds(board, &manifests, false))
            }
            _ => {
                let manifests = history
                    .manifests_since_days(self.lookback_days(), board)
                    .await?;
                Ok(render_builds(board, &manifests, true))
            }
        }
    }

    /// Dispatch `branch_builds` for `board` to every subscribed task.
    ///
    /// Tasks run against a snapshot of the set; tasks that ask to be retired
    /// are removed after all have run. A failing or hung task is logged and
    /// stays subscribed without affecting the others.
    pub async fn handle(
        &mut self,
        scheduler: &dyn DedupingScheduler,
        branch_builds: &BranchBuilds,
        board: &str,
        force: bool,
    ) -> HandleReport {
        let keyword = self.keyword();
        let snapshot: Vec<Task> = self.tasks.iter().cloned().collect();
        let mut report = HandleReport::default();
        let mut retiring = Vec::new();

        debug!(event = %keyword, board, tasks = snapshot.len(), "Handling event");

        for task in snapshot {
            let outcome = timeout(
                self.dispatch_timeout,
                task.run(scheduler, branch_builds, board, force),
            )
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout(format!(
                    "task {} on {board} after {}s",
                    task.name(),
                    self.dispatch_timeout.as_secs()
                )))
            });

            match outcome {
                Ok(true) => report.ran += 1,
                Ok(false) => {
                    report.ran += 1;
                    retiring.push(task);
                }
                Err(e) => {
                    error!(event = %keyword, task = %task.name(), board, error = %e, "Task failed");
                    report.failed += 1;
                }
            }
        }

        for task in retiring {
            if self.tasks.remove(&task) {
                info!(event = %keyword, task = %task.name(), "Retired one-shot task");
                report.retired += 1;
            }
        }

        report
    }

    /// Record that the current cycle has been handled.
    pub async fn update_criteria(&mut self, history: &dyn VersionHistory) -> Result<()> {
        match &mut self.kind {
            EventKind::NewBuild { checkpoint } => {
                let current = history.current_checkpoint().await?;
                debug!(event = %EventKeyword::NewBuild, checkpoint = %current, "Advanced checkpoint");
                *checkpoint = Some(current);
            }
            _ => self.update_criteria_at(now()),
        }
        Ok(())
    }

    /// Move a timed event's deadline past `now` by whole periods.
    pub fn update_criteria_at(&mut self, now: NaiveDateTime) {
        let (deadline, period) = match &mut self.kind {
            EventKind::NewBuild { .. } => return,
            EventKind::Nightly { deadline, .. } => (deadline, ChronoDuration::days(1)),
            EventKind::Weekly { deadline, .. } => (deadline, ChronoDuration::weeks(1)),
        };
        while *deadline <= now {
            *deadline += period;
        }
        debug!(deadline = %deadline, "Moved deadline");
    }

    fn require_checkpoint<'a>(&self, checkpoint: &'a Option<Checkpoint>) -> Result<&'a Checkpoint> {
        checkpoint
            .as_ref()
            .ok_or_else(|| Error::EventNotPrepared(self.keyword().to_string()))
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// The configured time on the current day (or `day` of the current week),
/// pushed one period ahead if it has already passed.
fn first_deadline(now: NaiveDateTime, day: Option<u32>, hour: u32) -> Result<NaiveDateTime> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)
        .ok_or_else(|| Error::MalformedConfig(format!("hour out of range: {hour}")))?;

    let (date, period) = match day {
        None => (now.date(), ChronoDuration::days(1)),
        Some(day) if day < 7 => {
            let today = now.weekday().num_days_from_monday();
            let ahead = (day + 7 - today) % 7;
            (
                now.date() + ChronoDuration::days(i64::from(ahead)),
                ChronoDuration::weeks(1),
            )
        }
        Some(day) => {
            return Err(Error::MalformedConfig(format!("day out of range: {day}")));
        }
    };

    let mut deadline = date.and_time(time);
    if deadline < now {
        deadline += period;
    }
    Ok(deadline)
}

/// Render discovered manifests into full build names keyed by branch name.
fn render_builds(board: &str, manifests: &BranchManifests, latest_only: bool) -> BranchBuilds {
    let mut builds = BranchBuilds::new();
    for (branch, versions) in manifests {
        let picked: Vec<_> = if latest_only {
            versions.last().into_iter().collect()
        } else {
            versions.iter().collect()
        };
        if picked.is_empty() {
            warn!(board, branch = %branch, "Branch listed with no manifests");
            continue;
        }
        builds
            .entry(branch.branch_name().to_string())
            .or_default()
            .extend(picked.into_iter().map(|manifest| {
                build_name(board, &branch.branch_type, &branch.milestone, manifest.as_str())
            }));
    }
    builds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskConfig;
    use buildwatch_core::{BranchKey, ManifestVersion};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn task(suite: &str, one_shot: bool) -> Task {
        Task::from_config(
            TaskConfig {
                name: suite.to_string(),
                suite: suite.to_string(),
                run_on: "nightly".to_string(),
                one_shot,
                ..Default::default()
            },
            None,
        )
        .unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    const HOUR: u32 = 20;

    // 2012-01-01 is a Sunday.
    fn nightly_base() -> NaiveDateTime {
        at(2012, 1, 1, HOUR, 0, 0)
    }

    #[test]
    fn test_event_dedupes_tasks() {
        let event = Event::new_build([task("bvt", false), task("bvt", false), task("smoke", false)]);
        assert_eq!(event.tasks().count(), 2);
    }

    #[test]
    fn test_keyword_round_trip() {
        for keyword in EventKeyword::ALL {
            assert_eq!(keyword.as_str().parse::<EventKeyword>().unwrap(), keyword);
        }
        assert!("hourly".parse::<EventKeyword>().is_err());
    }

    #[test]
    fn test_nightly_deadline_in_future() {
        let created = nightly_base() - ChronoDuration::hours(1);
        let event = Event::nightly_at(HOUR, created, []).unwrap();
        assert!(!event.is_due_at(created));
        assert!(event.is_due_at(created + ChronoDuration::hours(2)));
    }

    #[test]
    fn test_nightly_deadline_in_past() {
        let created = nightly_base() + ChronoDuration::hours(1);
        let event = Event::nightly_at(HOUR, created, []).unwrap();
        assert_eq!(event.deadline(), Some(nightly_base() + ChronoDuration::days(1)));
        assert!(!event.is_due_at(created));
        assert!(event.is_due_at(created + ChronoDuration::days(1)));
    }

    #[test]
    fn test_nightly_deadline_is_now() {
        let event = Event::nightly_at(HOUR, nightly_base(), []).unwrap();
        assert!(event.is_due_at(nightly_base()));
    }

    #[test]
    fn test_nightly_toctou() {
        let created = nightly_base() - ChronoDuration::seconds(1);
        let fired = nightly_base() + ChronoDuration::seconds(1);
        let event = Event::nightly_at(HOUR, created, []).unwrap();
        assert!(event.is_due_at(fired));
    }

    #[test]
    fn test_nightly_update_criteria() {
        let mut event = Event::nightly_at(HOUR, nightly_base(), []).unwrap();
        let handled = nightly_base() + ChronoDuration::minutes(5);
        event.update_criteria_at(handled);
        assert_eq!(event.deadline(), Some(nightly_base() + ChronoDuration::days(1)));
        assert!(!event.is_due_at(handled));
    }

    #[test]
    fn test_update_criteria_skips_missed_periods() {
        let mut event = Event::nightly_at(HOUR, nightly_base(), []).unwrap();
        let much_later = nightly_base() + ChronoDuration::days(3) + ChronoDuration::hours(1);
        event.update_criteria_at(much_later);
        assert_eq!(event.deadline(), Some(nightly_base() + ChronoDuration::days(4)));
    }

    const DAY: u32 = 5;

    // Saturday 2012-01-07 at 22:00.
    fn weekly_base() -> NaiveDateTime {
        at(2012, 1, 7, 22, 0, 0)
    }

    #[test]
    fn test_weekly_deadline_in_future() {
        let created = weekly_base() - ChronoDuration::days(1);
        let event = Event::weekly_at(DAY, 22, created, []).unwrap();
        assert_eq!(event.deadline(), Some(weekly_base()));
        assert!(!event.is_due_at(created));
        assert!(event.is_due_at(created + ChronoDuration::days(2)));
    }

    #[test]
    fn test_weekly_deadline_in_past() {
        let created = weekly_base() + ChronoDuration::days(1);
        let event = Event::weekly_at(DAY, 22, created, []).unwrap();
        assert_eq!(event.deadline(), Some(weekly_base() + ChronoDuration::weeks(1)));
        assert!(!event.is_due_at(created));
        assert!(event.is_due_at(created + ChronoDuration::weeks(1)));
    }

    #[test]
    fn test_weekly_deadline_is_now() {
        let event = Event::weekly_at(DAY, 22, weekly_base(), []).unwrap();
        assert!(event.is_due_at(weekly_base()));
    }

    #[test]
    fn test_weekly_toctou() {
        let created = weekly_base() - ChronoDuration::seconds(1);
        let event = Event::weekly_at(DAY, 22, created, []).unwrap();
        assert!(event.is_due_at(weekly_base() + ChronoDuration::seconds(1)));
    }

    #[test]
    fn test_timed_config_out_of_range() {
        assert!(Event::nightly_at(24, nightly_base(), []).is_err());
        assert!(Event::weekly_at(7, 22, nightly_base(), []).is_err());
    }

    #[test]
    fn test_lookback_covers_event_period() {
        let nightly = Event::nightly(21, []).unwrap();
        let weekly = Event::weekly(5, 23, []).unwrap();
        assert_eq!(nightly.lookback_days(), 1);
        assert_eq!(weekly.lookback_days(), 7);

        assert_eq!(nightly.clone().with_lookback_days(3).lookback_days(), 3);
        assert_eq!(weekly.clone().with_lookback_days(1).lookback_days(), 7);
        assert_eq!(weekly.with_lookback_days(14).lookback_days(), 14);
    }

    #[test]
    fn test_render_all_builds() {
        let manifests = BranchManifests::from([
            (
                BranchKey::new("release", "20"),
                vec![ManifestVersion::new("2057.0.9"), ManifestVersion::new("2057.0.10")],
            ),
            (
                BranchKey::new("factory", "17"),
                vec![ManifestVersion::new("1412.52.0")],
            ),
        ]);

        let all = render_builds("x86-alex", &manifests, false);
        assert_eq!(
            all,
            BranchBuilds::from([
                (
                    "factory".to_string(),
                    vec!["x86-alex-factory/R17-1412.52.0".to_string()]
                ),
                (
                    "20".to_string(),
                    vec![
                        "x86-alex-release/R20-2057.0.9".to_string(),
                        "x86-alex-release/R20-2057.0.10".to_string(),
                    ]
                ),
            ])
        );

        let latest = render_builds("x86-alex", &manifests, true);
        assert_eq!(latest["20"], vec!["x86-alex-release/R20-2057.0.10".to_string()]);
    }
}
