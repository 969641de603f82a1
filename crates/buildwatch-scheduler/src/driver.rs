//! The poll loop tying history, events and tasks together.

use crate::config::SchedulerConfig;
use crate::event::{Event, EventKeyword};
use crate::task::Task;
use buildwatch_core::ports::{BoardEnumerator, DedupingScheduler, VersionHistory};
use buildwatch_core::{BranchBuilds, Error, Result, parse_build_name, pick_branch_name};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Build every supported event with the configured tasks subscribed.
///
/// A task whose `run_on` names no known event is skipped with a warning;
/// any other malformed entry is an error.
pub fn events_from_config(config: &SchedulerConfig) -> Result<BTreeMap<EventKeyword, Event>> {
    let events_config = &config.events;
    let mut events = BTreeMap::new();
    for event in [
        Event::new_build([]),
        Event::nightly(events_config.nightly.hour, [])?,
        Event::weekly(events_config.weekly.day, events_config.weekly.hour, [])?,
    ] {
        let mut event = event.with_dispatch_timeout(config.dispatch_timeout());
        if let Some(days) = events_config.lookback_days {
            event = event.with_lookback_days(days);
        }
        events.insert(event.keyword(), event);
    }

    for task_config in &config.tasks {
        let task = Task::from_config(task_config.clone(), config.tot_milestone)?;
        let Ok(keyword) = task.run_on().parse::<EventKeyword>() else {
            warn!(task = %task.name(), run_on = %task.run_on(), "Unknown event, skipping task");
            continue;
        };
        if let Some(event) = events.get_mut(&keyword) {
            let name = task.name().to_string();
            if !event.add_task(task) {
                debug!(task = %name, event = %keyword, "Duplicate task collapsed");
            }
        }
    }

    for event in events.values() {
        info!(event = %event.keyword(), tasks = event.tasks().count(), "Event set up");
    }
    Ok(events)
}

/// Polls the history and dispatches new builds to the configured events.
pub struct Driver {
    scheduler: Arc<dyn DedupingScheduler>,
    boards: Arc<dyn BoardEnumerator>,
    history: Arc<dyn VersionHistory>,
    config: SchedulerConfig,
    events: BTreeMap<EventKeyword, Event>,
}

impl Driver {
    pub fn new(
        scheduler: Arc<dyn DedupingScheduler>,
        boards: Arc<dyn BoardEnumerator>,
        history: Arc<dyn VersionHistory>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            scheduler,
            boards,
            history,
            config,
            events: BTreeMap::new(),
        }
    }

    /// Keywords of every supported event.
    pub fn list_events() -> Vec<&'static str> {
        EventKeyword::ALL.iter().map(EventKeyword::as_str).collect()
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    pub fn event(&self, keyword: EventKeyword) -> Option<&Event> {
        self.events.get(&keyword)
    }

    /// Build every event and subscribe the configured tasks to them.
    pub fn set_up_events_and_tasks(&mut self) -> Result<()> {
        self.events = events_from_config(&self.config)?;
        Ok(())
    }

    /// Capture each event's starting point in the history.
    pub async fn prepare(&mut self) -> Result<()> {
        for event in self.events.values_mut() {
            event.prepare(self.history.as_ref()).await?;
        }
        Ok(())
    }

    /// One poll cycle.
    ///
    /// Refreshing the history or listing boards failing skips the whole
    /// cycle. An event whose discovery failed for any board keeps its
    /// criteria so those builds are seen again next cycle.
    pub async fn run_once(&mut self) -> Result<()> {
        self.history.update().await?;
        let boards = self.boards.enumerate().await?;
        let history = self.history.as_ref();
        let scheduler = self.scheduler.as_ref();

        for event in self.events.values_mut() {
            let keyword = event.keyword();
            match event.should_handle(history).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(event = %keyword, "Nothing to handle");
                    continue;
                }
                Err(e) => {
                    error!(event = %keyword, error = %e, "Could not check event");
                    continue;
                }
            }

            info!(event = %keyword, boards = boards.len(), "Handling event");
            let mut complete = true;
            for board in &boards {
                let branch_builds = match event.get_branch_builds_for_board(board, history).await {
                    Ok(builds) => builds,
                    Err(e) => {
                        error!(event = %keyword, board = %board, error = %e, "Build discovery failed");
                        complete = false;
                        continue;
                    }
                };
                let report = event.handle(scheduler, &branch_builds, board, false).await;
                debug!(
                    event = %keyword,
                    board = %board,
                    ran = report.ran,
                    retired = report.retired,
                    failed = report.failed,
                    "Handled board"
                );
            }

            if !complete {
                warn!(event = %keyword, "Keeping criteria after failed discovery");
                continue;
            }
            if let Err(e) = event.update_criteria(history).await {
                error!(event = %keyword, error = %e, "Could not update criteria");
            }
        }

        Ok(())
    }

    /// Poll until `shutdown` is set.
    pub async fn run_forever(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_interval());

        info!(
            interval_secs = self.config.poll_interval_secs,
            events = self.events.len(),
            "Starting driver loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Poll cycle skipped");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Driver shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fire the named events once for `build`, bypassing deduplication.
    pub async fn force_events_once_for_build<S: AsRef<str>>(
        &mut self,
        keywords: &[S],
        build: &str,
    ) -> Result<()> {
        let parsed = parse_build_name(build)?;
        let branch = pick_branch_name(&parsed.branch_type, &parsed.milestone).to_string();
        let branch_builds = BranchBuilds::from([(branch, vec![build.to_string()])]);

        for keyword in keywords {
            let keyword: EventKeyword = keyword.as_ref().parse()?;
            let event = self.events.get_mut(&keyword).ok_or_else(|| {
                Error::Internal(format!("event {keyword} is not set up"))
            })?;

            info!(event = %keyword, build, board = %parsed.board, "Forcing event");
            let report = event
                .handle(self.scheduler.as_ref(), &branch_builds, &parsed.board, true)
                .await;
            if report.failed > 0 {
                warn!(event = %keyword, build, failed = report.failed, "Some tasks failed");
            }
        }
        Ok(())
    }
}
