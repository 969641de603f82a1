//! Branch identity and the maps produced by manifest discovery.

use crate::version::{LooseVersion, ManifestVersion};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Branch types that are addressed by name rather than by milestone.
pub const BARE_BRANCHES: [&str; 2] = ["factory", "firmware"];

/// A fully specified branch, e.g. `("release", "20")` or `("factory", "17")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchKey {
    pub branch_type: String,
    pub milestone: String,
}

impl BranchKey {
    pub fn new(branch_type: impl Into<String>, milestone: impl Into<String>) -> Self {
        Self {
            branch_type: branch_type.into(),
            milestone: milestone.into(),
        }
    }

    /// Name used as the key in [`BranchBuilds`].
    pub fn branch_name(&self) -> &str {
        pick_branch_name(&self.branch_type, &self.milestone)
    }
}

impl Ord for BranchKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.branch_type.cmp(&other.branch_type).then_with(|| {
            LooseVersion::new(self.milestone.as_str()).cmp(&LooseVersion::new(other.milestone.as_str()))
        })
    }
}

impl PartialOrd for BranchKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/R{}", self.branch_type, self.milestone)
    }
}

/// Branch -> manifests on that branch, each list sorted oldest to newest.
pub type BranchManifests = BTreeMap<BranchKey, Vec<ManifestVersion>>;

/// Branch name -> full build names, e.g. `{"20": ["x86-alex-release/R20-2057.0.10"]}`.
///
/// Bare branches are keyed by their type so that configuration can address
/// "the factory branch" without knowing its milestone.
pub type BranchBuilds = BTreeMap<String, Vec<String>>;

/// Pick the key a branch is filed under in [`BranchBuilds`].
pub fn pick_branch_name<'a>(branch_type: &'a str, milestone: &'a str) -> &'a str {
    if BARE_BRANCHES.contains(&branch_type) {
        branch_type
    } else {
        milestone
    }
}
