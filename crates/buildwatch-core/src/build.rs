//! Canonical build names.
//!
//! A build name has the form `<board>-<branch_type>/R<milestone>-<manifest>`,
//! e.g. `x86-alex-release/R20-2057.0.10`. The board may itself contain
//! hyphens; the branch type is the token after the last hyphen before `/`.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const BUILD_NAME_PATTERN: &str = r"^(?P<board>[^/]+)-(?P<branch_type>[A-Za-z0-9]+)/R(?P<milestone>\d+)-(?P<manifest>[A-Za-z0-9.\-]+)$";

fn build_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(BUILD_NAME_PATTERN).expect("build name pattern is valid"))
}

/// Structured form of a build name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildName {
    pub board: String,
    pub branch_type: String,
    pub milestone: String,
    pub manifest: String,
}

impl BuildName {
    pub fn new(
        board: impl Into<String>,
        branch_type: impl Into<String>,
        milestone: impl Into<String>,
        manifest: impl Into<String>,
    ) -> Self {
        Self {
            board: board.into(),
            branch_type: branch_type.into(),
            milestone: milestone.into(),
            manifest: manifest.into(),
        }
    }
}

/// Format a build name from its parts.
pub fn build_name(board: &str, branch_type: &str, milestone: &str, manifest: &str) -> String {
    format!("{board}-{branch_type}/R{milestone}-{manifest}")
}

/// Parse a build name into its parts.
pub fn parse_build_name(name: &str) -> Result<BuildName> {
    let caps = build_name_regex()
        .captures(name)
        .ok_or_else(|| Error::MalformedBuildName(name.to_string()))?;

    Ok(BuildName::new(
        &caps["board"],
        &caps["branch_type"],
        &caps["milestone"],
        &caps["manifest"],
    ))
}

impl fmt::Display for BuildName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&build_name(
            &self.board,
            &self.branch_type,
            &self.milestone,
            &self.manifest,
        ))
    }
}

impl FromStr for BuildName {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parse_build_name(s)
    }
}
