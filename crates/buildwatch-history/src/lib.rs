//! Git-backed manifest history for buildwatch.
//!
//! The history is a git repository holding one committed manifest file per
//! successful build, laid out as
//! `build-name/<board>-<branch_type>[-group]/pass/<milestone>/<manifest>.xml`.
//! Only the existence of the path matters; the XML is never read.

pub mod config;
pub mod git;
pub mod history;

pub use config::HistoryConfig;
pub use git::GitCli;
pub use history::GitVersionHistory;
