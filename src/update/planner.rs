//! Update planner - decides whether the remote release is newer

use super::error::Result;
use super::release::VersionInfo;
use super::version::Version;
use serde::{Deserialize, Serialize};

/// Result of comparing the local build with the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateDecision {
    NoUpdate,
    UpdateAvailable,
}

/// Compare the local version against the remote release.
///
/// Both strings must be strict `major.minor.patch`; a malformed value is a
/// `VersionParse` error, which callers treat as "no update" plus a warning.
pub fn plan(local_version: &str, remote: &VersionInfo) -> Result<UpdateDecision> {
    let local = Version::parse(local_version)?;
    let latest = Version::parse(remote.version())?;
    Ok(compare(&local, &latest))
}

/// Decision for already-parsed versions
pub fn compare(local: &Version, remote: &Version) -> UpdateDecision {
    if remote > local {
        UpdateDecision::UpdateAvailable
    } else {
        UpdateDecision::NoUpdate
    }
}

/// True when the user dismissed exactly this remote version
pub fn is_skipped(remote: &VersionInfo, skipped_version: Option<&str>) -> bool {
    let Some(skipped) = skipped_version else {
        return false;
    };
    match (Version::parse(skipped), Version::parse(remote.version())) {
        (Ok(skipped), Ok(remote)) => skipped == remote,
        _ => false,
    }
}
