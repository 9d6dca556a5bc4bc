//! Strict three-part semantic versions

use super::error::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Semantic version representation (`major.minor.patch`, numeric fields only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Which component a release bump increments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpKind {
    Major,
    Minor,
    Patch,
}

/// Trim whitespace and a single leading `v`/`V` from a release tag
pub(crate) fn strip_tag_prefix(tag: &str) -> &str {
    let trimmed = tag.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

impl Version {
    /// Create a new version
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse version from string (e.g., "1.2.3" or a release tag like "v1.2.3")
    pub fn parse(s: &str) -> Result<Self> {
        let body = strip_tag_prefix(s);

        let parts: Vec<&str> = body.split('.').collect();
        if parts.len() != 3 {
            return Err(UpdateError::VersionParse(format!(
                "Expected 3 version components in {:?}, got {}",
                s,
                parts.len()
            )));
        }

        let major = parse_component(parts[0], "major", s)?;
        let minor = parse_component(parts[1], "minor", s)?;
        let patch = parse_component(parts[2], "patch", s)?;

        Ok(Self { major, minor, patch })
    }

    /// Next version after a release bump; lower components reset to zero
    pub fn bump(&self, kind: BumpKind) -> Self {
        match kind {
            BumpKind::Major => Self::new(self.major.saturating_add(1), 0, 0),
            BumpKind::Minor => Self::new(self.major, self.minor.saturating_add(1), 0),
            BumpKind::Patch => Self::new(self.major, self.minor, self.patch.saturating_add(1)),
        }
    }
}

fn parse_component(part: &str, name: &str, original: &str) -> Result<u32> {
    // u32::from_str accepts a leading '+', which is not a version digit
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UpdateError::VersionParse(format!(
            "Invalid {} version {:?} in {:?}",
            name, part, original
        )));
    }
    part.parse().map_err(|_| {
        UpdateError::VersionParse(format!(
            "{} version {:?} out of range in {:?}",
            name, part, original
        ))
    })
}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
