//! Runtime configuration for the updater

use super::error::{Result, UpdateError};
use super::policy::{HostAllowList, DEFAULT_ALLOWED_HOSTS};
use std::path::PathBuf;
use std::time::Duration;

/// Release feed queried by default
pub const DEFAULT_UPDATE_ENDPOINT: &str =
    "https://api.github.com/repos/YourUsername/bash-and-dash/releases/latest";

/// 50 MiB
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Anything smaller is treated as a truncated or empty payload
pub const DEFAULT_MIN_DOWNLOAD_BYTES: u64 = 1024;

/// Configuration for the update coordinator
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Release metadata endpoint
    pub endpoint: String,
    /// Exact host names the updater may contact
    pub allowed_hosts: Vec<String>,
    /// Permit plain HTTP to loopback hosts on the allow-list
    pub allow_insecure_loopback: bool,
    /// Whole-request timeout for the metadata fetch
    pub request_timeout: Duration,
    /// TCP/TLS connect timeout for both requests
    pub connect_timeout: Duration,
    /// Per-operation timeout for each body read and file write
    pub io_timeout: Duration,
    pub max_download_bytes: u64,
    pub min_download_bytes: u64,
    /// Suffix of the GitHub release asset to download
    pub asset_suffix: String,
    /// Directory for in-flight downloads
    pub temp_dir: PathBuf,
    /// Directory holding the staged artifact and marker
    pub staging_dir: PathBuf,
    /// Executable replaced on restart; `None` means the running binary
    pub target_exe: Option<PathBuf>,
    /// Start the download as soon as an update is found
    pub auto_download: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        let staging_dir = directories::BaseDirs::new()
            .map(|dirs| dirs.data_local_dir().join("BashAndDash").join("updates"))
            .unwrap_or_else(|| PathBuf::from("updates"));

        Self {
            endpoint: DEFAULT_UPDATE_ENDPOINT.to_string(),
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
            allow_insecure_loopback: false,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            min_download_bytes: DEFAULT_MIN_DOWNLOAD_BYTES,
            asset_suffix: ".exe".to_string(),
            temp_dir: std::env::temp_dir().join("bashdash-updater"),
            staging_dir,
            target_exe: None,
            auto_download: false,
        }
    }
}

impl UpdaterConfig {
    /// Allow-list built from this configuration
    pub fn policy(&self) -> HostAllowList {
        HostAllowList::new(self.allowed_hosts.iter().cloned())
            .with_insecure_loopback(self.allow_insecure_loopback)
    }

    /// Reject inconsistent settings before any I/O happens
    pub fn validate(&self) -> Result<()> {
        if self.max_download_bytes == 0 {
            return Err(UpdateError::Config(
                "max_download_bytes must be greater than zero".to_string(),
            ));
        }
        if self.min_download_bytes > self.max_download_bytes {
            return Err(UpdateError::Config(format!(
                "min_download_bytes ({}) exceeds max_download_bytes ({})",
                self.min_download_bytes, self.max_download_bytes
            )));
        }
        if self.request_timeout.is_zero() || self.io_timeout.is_zero() {
            return Err(UpdateError::Config("timeouts must be non-zero".to_string()));
        }
        self.policy()
            .parse_and_check(&self.endpoint)
            .map_err(|e| UpdateError::Config(format!("update endpoint rejected: {}", e)))?;
        Ok(())
    }

    /// Executable that a staged update replaces
    pub fn resolve_target_exe(&self) -> Result<PathBuf> {
        match &self.target_exe {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_exe()?),
        }
    }
}
