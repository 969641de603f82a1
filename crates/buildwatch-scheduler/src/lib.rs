//! Event and task dispatch for buildwatch.
//!
//! Events decide when to look at the manifest history and which builds are
//! new; tasks turn those builds into suite requests; the driver runs the
//! poll loop over both.

pub mod boards;
pub mod branch_spec;
pub mod config;
pub mod dedup;
pub mod driver;
pub mod event;
pub mod task;

pub use boards::StaticBoards;
pub use branch_spec::BranchSpecs;
pub use config::{EventsConfig, NightlyConfig, SchedulerConfig, WeeklyConfig};
pub use dedup::InMemoryDedupingScheduler;
pub use driver::{Driver, events_from_config};
pub use event::{Event, EventKeyword, EventKind, HandleReport};
pub use task::{Task, TaskConfig, TaskKey};
