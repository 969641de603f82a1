//! Branch specifications: which branches a task wants builds from.
//!
//! A task lists any of the bare branches (`factory`, `firmware`) plus at most
//! one numeric constraint on the milestone:
//!
//! - `>=R18`: milestone 18 or newer
//! - `==R18`: exactly milestone 18
//! - `>=tot-1`, `==tot`: the same, relative to the tip-of-tree milestone
//!
//! A tip-of-tree spec without an operator (`tot-2`) means `>=`. An empty list
//! matches every numbered branch and no bare branch.

use buildwatch_core::version::LooseVersion;
use buildwatch_core::{BARE_BRANCHES, Error, Result};
use std::cmp::Ordering;

/// Constraint on the milestone of a numbered branch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Constraint {
    AtLeast(LooseVersion),
    Exactly(LooseVersion),
}

/// Parsed, validated branch specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSpecs {
    bare: Vec<String>,
    constraint: Option<Constraint>,
}

impl BranchSpecs {
    /// Parse `specs`, resolving tip-of-tree references against `tot`.
    pub fn parse<S: AsRef<str>>(specs: &[S], tot: Option<u32>) -> Result<Self> {
        if specs.is_empty() {
            return Ok(Self {
                bare: Vec::new(),
                constraint: Some(Constraint::AtLeast(LooseVersion::new("0"))),
            });
        }

        let mut bare = Vec::new();
        let mut constraint = None;

        for spec in specs {
            let spec = spec.as_ref().trim();
            if BARE_BRANCHES.contains(&spec) {
                bare.push(spec.to_string());
                continue;
            }
            if constraint.is_some() {
                return Err(Error::MalformedConfig(format!(
                    "{spec} isn't a valid branch spec: only one numeric constraint is allowed"
                )));
            }
            constraint = Some(parse_constraint(spec, tot)?);
        }

        Ok(Self { bare, constraint })
    }

    /// Whether `branch` (a bare branch name or a milestone) fits these specs.
    pub fn fits(&self, branch: &str) -> bool {
        if BARE_BRANCHES.contains(&branch) {
            return self.bare.iter().any(|b| b == branch);
        }
        let milestone = LooseVersion::new(branch);
        match &self.constraint {
            Some(Constraint::AtLeast(min)) => milestone >= *min,
            Some(Constraint::Exactly(want)) => milestone.cmp(want) == Ordering::Equal,
            None => false,
        }
    }
}

fn parse_constraint(spec: &str, tot: Option<u32>) -> Result<Constraint> {
    let invalid = || Error::MalformedConfig(format!("{spec} isn't a valid branch spec"));

    let (exact, rest) = if let Some(rest) = spec.strip_prefix(">=") {
        (Some(false), rest)
    } else if let Some(rest) = spec.strip_prefix("==") {
        (Some(true), rest)
    } else {
        (None, spec)
    };

    let milestone = if rest.to_ascii_lowercase().starts_with("tot") {
        resolve_tot(rest, tot)?
    } else {
        // A literal milestone needs an operator.
        exact.ok_or_else(invalid)?;
        let digits = rest.strip_prefix('R').ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        digits.to_string()
    };

    let milestone = LooseVersion::new(milestone);
    Ok(match exact {
        Some(true) => Constraint::Exactly(milestone),
        _ => Constraint::AtLeast(milestone),
    })
}

/// `tot` -> ToT, `tot-1` -> ToT - 1, `tot-2` -> ToT - 2.
fn resolve_tot(spec: &str, tot: Option<u32>) -> Result<String> {
    let back = match spec.to_ascii_lowercase().as_str() {
        "tot" => 0,
        "tot-1" => 1,
        "tot-2" => 2,
        _ => {
            return Err(Error::MalformedConfig(format!(
                "{spec} isn't a valid branch spec: expected tot, tot-1 or tot-2"
            )));
        }
    };
    let tot = tot.ok_or_else(|| {
        Error::MalformedConfig(format!("{spec} needs tot_milestone to be configured"))
    })?;
    Ok(tot.saturating_sub(back).to_string())
}
