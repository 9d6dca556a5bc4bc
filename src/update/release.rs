//! Release metadata and downloaded artifacts
//!
//! The feed may be either a small custom manifest or a GitHub
//! "latest release" object; both are normalized into [`VersionInfo`].

use super::error::{Result, UpdateError};
use super::policy::HostAllowList;
use super::version::strip_tag_prefix;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;
use tempfile::TempPath;

/// Information about the latest published release.
///
/// Built only through [`VersionInfo::new`], so the download URL has always
/// passed the allow-list and the hash (if any) is normalized lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    version: String,
    download_url: Url,
    changelog: String,
    expected_hash: Option<String>,
    size_hint: Option<u64>,
    published_at: Option<DateTime<Utc>>,
}

impl VersionInfo {
    /// Validate and build release info
    pub fn new(
        version: impl Into<String>,
        download_url: &str,
        changelog: impl Into<String>,
        expected_hash: Option<&str>,
        policy: &HostAllowList,
    ) -> Result<Self> {
        let version = version.into().trim().to_string();
        if version.is_empty() {
            return Err(UpdateError::MalformedResponse("empty version".to_string()));
        }

        let download_url = policy.parse_and_check(download_url)?;
        let expected_hash = expected_hash
            .map(normalize_sha256)
            .transpose()?;

        Ok(Self {
            version,
            download_url,
            changelog: changelog.into(),
            expected_hash,
            size_hint: None,
            published_at: None,
        })
    }

    /// Attach the size advertised by the feed
    pub fn with_size_hint(mut self, size: Option<u64>) -> Self {
        self.size_hint = size;
        self
    }

    /// Attach the publication timestamp advertised by the feed
    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    /// Remote version string as published (not yet parsed)
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn download_url(&self) -> &Url {
        &self.download_url
    }

    pub fn changelog(&self) -> &str {
        &self.changelog
    }

    /// Expected SHA-256 in lowercase hex, when the feed provides one
    pub fn expected_hash(&self) -> Option<&str> {
        self.expected_hash.as_deref()
    }

    pub fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }
}

fn normalize_sha256(raw: &str) -> Result<String> {
    let hex = raw.trim();
    let hex = hex.strip_prefix("sha256:").unwrap_or(hex);
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(UpdateError::MalformedResponse(format!(
            "invalid sha256 value: {:?}",
            raw
        )));
    }
    Ok(hex.to_ascii_lowercase())
}

/// Custom manifest: `{"version", "download_url", "changelog", "sha256"}`
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseManifest {
    pub version: String,
    pub download_url: String,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// Subset of the GitHub "latest release" API object
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// `sha256:<hex>` when GitHub has computed an asset digest
    #[serde(default)]
    pub digest: Option<String>,
}

const DEFAULT_CHANGELOG: &str = "Bug fixes and improvements";

/// Parse a feed body into release info.
///
/// A payload with a `tag_name` key is treated as a GitHub release; anything
/// else must be a custom manifest.
pub fn parse_release_payload(
    body: &[u8],
    policy: &HostAllowList,
    asset_suffix: &str,
) -> Result<VersionInfo> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| UpdateError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(UpdateError::MalformedResponse(
            "release payload is not a JSON object".to_string(),
        ));
    }

    if value.get("tag_name").is_some() {
        let release: GithubRelease = serde_json::from_value(value)
            .map_err(|e| UpdateError::MalformedResponse(format!("GitHub release: {}", e)))?;
        github_release_info(release, policy, asset_suffix)
    } else {
        let manifest: ReleaseManifest = serde_json::from_value(value)
            .map_err(|e| UpdateError::MalformedResponse(format!("release manifest: {}", e)))?;
        manifest_info(manifest, policy)
    }
}

fn manifest_info(manifest: ReleaseManifest, policy: &HostAllowList) -> Result<VersionInfo> {
    Ok(VersionInfo::new(
        manifest.version,
        &manifest.download_url,
        manifest
            .changelog
            .unwrap_or_else(|| DEFAULT_CHANGELOG.to_string()),
        manifest.sha256.as_deref(),
        policy,
    )?
    .with_size_hint(manifest.size)
    .with_published_at(manifest.published_at))
}

fn github_release_info(
    release: GithubRelease,
    policy: &HostAllowList,
    asset_suffix: &str,
) -> Result<VersionInfo> {
    let suffix = asset_suffix.to_ascii_lowercase();
    let asset = release
        .assets
        .iter()
        .find(|a| a.name.to_ascii_lowercase().ends_with(&suffix))
        .ok_or_else(|| {
            UpdateError::MalformedResponse(format!(
                "release {} has no asset ending in {:?}",
                release.tag_name, asset_suffix
            ))
        })?;

    Ok(VersionInfo::new(
        strip_tag_prefix(&release.tag_name),
        &asset.browser_download_url,
        release
            .body
            .clone()
            .unwrap_or_else(|| DEFAULT_CHANGELOG.to_string()),
        asset.digest.as_deref(),
        policy,
    )?
    .with_size_hint(asset.size)
    .with_published_at(release.published_at))
}

/// A downloaded artifact held in a temporary file.
///
/// The file is deleted when the artifact is dropped unless it has been
/// handed to a stager via [`LocalArtifact::into_temp_path`] and persisted.
#[derive(Debug)]
pub struct LocalArtifact {
    temp_path: TempPath,
    size: u64,
    hash: String,
}

impl LocalArtifact {
    pub(crate) fn new(temp_path: TempPath, size: u64, hash: String) -> Self {
        Self {
            temp_path,
            size,
            hash,
        }
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// SHA-256 computed while streaming; verification re-reads the file
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Delete the temp file now, reporting any removal error
    pub fn discard(self) -> std::io::Result<()> {
        self.temp_path.close()
    }

    pub(crate) fn into_temp_path(self) -> TempPath {
        self.temp_path
    }
}
