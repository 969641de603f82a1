//! Command handlers.

use crate::config::BuildwatchConfig;
use buildwatch_core::Result;
use buildwatch_core::ports::VersionHistory;
use buildwatch_history::GitVersionHistory;
use buildwatch_scheduler::{
    Driver, InMemoryDedupingScheduler, StaticBoards, events_from_config,
};
use std::sync::Arc;
use tokio::sync::watch;
#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{error, info};

/// Print the supported event keywords.
pub fn list_events() {
    println!("Supported events:");
    for keyword in Driver::list_events() {
        println!("  {}", keyword);
    }
}

/// Check that the configuration sets up cleanly, without touching the history.
pub fn sanity(config: &BuildwatchConfig) -> Result<()> {
    let events = events_from_config(&config.scheduler)?;
    for event in events.values() {
        println!("{}: {} tasks", event.keyword(), event.tasks().count());
        for task in event.tasks() {
            println!("  {}", task);
        }
    }
    println!("Configuration OK");
    Ok(())
}

fn build_driver(config: &BuildwatchConfig, history: Arc<dyn VersionHistory>) -> Result<Driver> {
    let scheduler = Arc::new(InMemoryDedupingScheduler::new());
    let boards = Arc::new(StaticBoards::new(config.scheduler.boards.clone()));
    let mut driver = Driver::new(scheduler, boards, history, config.scheduler.clone());
    driver.set_up_events_and_tasks()?;
    Ok(driver)
}

/// Fire `events` once for `build` and exit.
pub async fn force_events(config: &BuildwatchConfig, events: &[String], build: &str) -> Result<()> {
    let history = Arc::new(GitVersionHistory::new(config.history.clone())?);
    let mut driver = build_driver(config, history)?;
    driver.force_events_once_for_build(events, build).await
}

/// Clone the history and poll until interrupted.
pub async fn run(config: &BuildwatchConfig) -> Result<()> {
    let history = Arc::new(GitVersionHistory::new(config.history.clone())?);
    if let Err(e) = history.initialize().await {
        error!(url = %config.history.url, error = %e, "Could not set up manifest history");
        return Err(e);
    }

    let mut driver = build_driver(config, history)?;
    driver.prepare().await?;

    let mut signals = ShutdownSignals::register()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let signal = signals.recv().await;
        info!(signal, "Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    driver.run_forever(shutdown_rx).await;
    Ok(())
}

/// Signals that stop the poll loop: interrupt, plus terminate and hangup on unix.
struct ShutdownSignals {
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    hangup: Signal,
}

impl ShutdownSignals {
    /// Install the handlers now, so a signal arriving before
    /// [`recv`](Self::recv) is polled is not lost.
    fn register() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
            #[cfg(unix)]
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the first shutdown signal and name it.
    #[cfg(unix)]
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "ctrl-c"
    }
}
