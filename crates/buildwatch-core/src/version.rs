//! Loose version ordering for manifest versions and milestones.
//!
//! A version string is split into runs of digits (compared numerically),
//! runs of other characters (compared as strings), with `.` acting only as a
//! separator. At the same position a numeric run sorts before a textual one,
//! and a version that is a prefix of another sorts first. This is what keeps
//! `2057.0.9` ahead of `2057.0.10`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// One comparable run of a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
    /// Digits with leading zeros stripped, so length orders magnitude.
    Number(String),
    Text(String),
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Number(a), Component::Number(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Component::Number(_), Component::Text(_)) => Ordering::Less,
            (Component::Text(_), Component::Number(_)) => Ordering::Greater,
            (Component::Text(a), Component::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A version string ordered component-wise rather than lexicographically.
#[derive(Debug, Clone)]
pub struct LooseVersion {
    raw: String,
    components: Vec<Component>,
}

/// A manifest version such as `2057.0.10`, uniquely naming one build.
pub type ManifestVersion = LooseVersion;

impl LooseVersion {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let components = split_components(&raw);
        Self { raw, components }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn split_components(raw: &str) -> Vec<Component> {
    #[derive(PartialEq)]
    enum Run {
        Digit,
        Alpha,
        Other,
    }

    fn classify(c: char) -> Option<Run> {
        if c == '.' {
            None
        } else if c.is_ascii_digit() {
            Some(Run::Digit)
        } else if c.is_ascii_lowercase() {
            Some(Run::Alpha)
        } else {
            Some(Run::Other)
        }
    }

    fn finish(run: &Run, buf: &str, out: &mut Vec<Component>) {
        match run {
            Run::Digit => {
                let trimmed = buf.trim_start_matches('0');
                out.push(Component::Number(trimmed.to_string()));
            }
            Run::Alpha | Run::Other => out.push(Component::Text(buf.to_string())),
        }
    }

    let mut out = Vec::new();
    let mut current: Option<(Run, String)> = None;

    for c in raw.chars() {
        let class = classify(c);
        match (&mut current, class) {
            (Some((run, buf)), Some(class)) if *run == class => buf.push(c),
            (slot, class) => {
                if let Some((run, buf)) = slot.take() {
                    finish(&run, &buf, &mut out);
                }
                *slot = class.map(|class| (class, c.to_string()));
            }
        }
    }
    if let Some((run, buf)) = current {
        finish(&run, &buf, &mut out);
    }
    out
}

impl PartialEq for LooseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for LooseVersion {}

impl Ord for LooseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components
            .cmp(&other.components)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for LooseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for LooseVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for LooseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for LooseVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for LooseVersion {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
