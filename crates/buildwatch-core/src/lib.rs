//! Buildwatch Core
//!
//! Core domain types, port traits, and error handling for the buildwatch
//! suite scheduler. This crate has minimal dependencies and defines the
//! shared vocabulary used by the history, scheduler, and CLI crates.

pub mod branch;
pub mod build;
pub mod error;
pub mod ports;
pub mod version;

pub use branch::{BARE_BRANCHES, BranchBuilds, BranchKey, BranchManifests, pick_branch_name};
pub use build::{BuildName, build_name, parse_build_name};
pub use error::{Error, Result};
pub use version::ManifestVersion;
