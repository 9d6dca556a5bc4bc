//! Download executor
//!
//! Streams the artifact into a temp file while hashing it. The temp file is
//! owned by a [`TempPath`], so every early return (error, size violation,
//! cancellation) removes the partial file.

use super::config::UpdaterConfig;
use super::error::{Result, UpdateError};
use super::fetcher::{build_client, user_agent};
use super::policy::HostAllowList;
use super::release::{LocalArtifact, VersionInfo};
use super::state::DownloadProgress;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Prefix of every temp file the executor creates
pub const TEMP_FILE_PREFIX: &str = "bashdash-update-";

const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Callback receiving throttled progress
pub type ProgressSink<'a> = &'a (dyn Fn(DownloadProgress) + Send + Sync);

/// Downloads release artifacts into the temp directory
pub struct DownloadExecutor {
    client: reqwest::Client,
    policy: HostAllowList,
    temp_dir: PathBuf,
    io_timeout: Duration,
    max_bytes: u64,
    min_bytes: u64,
}

impl DownloadExecutor {
    pub fn new(config: &UpdaterConfig, local_version: &str) -> Result<Self> {
        let policy = config.policy();
        // No whole-request timeout: large bodies are bounded per read instead
        let client = build_client(
            &policy,
            None,
            config.connect_timeout,
            &user_agent(local_version),
        )?;

        Ok(Self {
            client,
            policy,
            temp_dir: config.temp_dir.clone(),
            io_timeout: config.io_timeout,
            max_bytes: config.max_download_bytes,
            min_bytes: config.min_download_bytes,
        })
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    fn size_error(&self, size: u64) -> UpdateError {
        UpdateError::SizeLimitExceeded {
            size,
            min: self.min_bytes,
            max: self.max_bytes,
        }
    }

    /// Download the release artifact into a fresh temp file.
    ///
    /// Honors `cancel` between every read and write. Progress is reported at
    /// most every 100 ms plus once at the start and once at the end.
    pub async fn download_and_stage(
        &self,
        info: &VersionInfo,
        cancel: &CancellationToken,
        on_progress: ProgressSink<'_>,
    ) -> Result<LocalArtifact> {
        let url = info.download_url();
        self.policy.check(url)?;

        if let Some(hint) = info.size_hint() {
            if hint > self.max_bytes {
                return Err(self.size_error(hint));
            }
        }

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let (std_file, temp_path) = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(".part")
            .tempfile_in(&self.temp_dir)?
            .into_parts();
        // Declared after `temp_path` so the handle is closed before removal
        let mut file = tokio::fs::File::from_std(std_file);

        info!(url = %url, temp = %temp_path.display(), "Downloading update");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
            sent = tokio::time::timeout(self.io_timeout, self.client.get(url.clone()).send()) => {
                sent.map_err(|_| stalled("waiting for response headers"))??
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Network(format!(
                "Server returned status: {}",
                status
            )));
        }

        let content_length = response.content_length();
        if let Some(length) = content_length {
            if length > self.max_bytes {
                return Err(self.size_error(length));
            }
        }
        let total = content_length.or(info.size_hint());

        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut last_progress = Instant::now();
        on_progress(DownloadProgress::new(0, total));

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
                next = tokio::time::timeout(self.io_timeout, stream.next()) => {
                    next.map_err(|_| stalled("reading response body"))?
                }
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            downloaded += chunk.len() as u64;
            if downloaded > self.max_bytes {
                return Err(self.size_error(downloaded));
            }
            hasher.update(&chunk);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
                written = tokio::time::timeout(self.io_timeout, file.write_all(&chunk)) => {
                    written.map_err(|_| stalled("writing temp file"))??
                }
            }

            let now = Instant::now();
            if now.duration_since(last_progress) >= PROGRESS_INTERVAL {
                last_progress = now;
                on_progress(DownloadProgress::new(downloaded, total));
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = content_length {
            if downloaded != expected {
                return Err(UpdateError::Network(format!(
                    "download truncated: received {} of {} bytes",
                    downloaded, expected
                )));
            }
        }

        if downloaded == 0 || downloaded < self.min_bytes {
            return Err(self.size_error(downloaded));
        }

        on_progress(DownloadProgress::new(downloaded, total.or(Some(downloaded))));

        let hash = hex::encode(hasher.finalize());
        info!(bytes = downloaded, sha256 = %hash, "Download complete");

        Ok(LocalArtifact::new(temp_path, downloaded, hash))
    }

    /// Remove temp files left behind by an interrupted process
    pub async fn cleanup_stale(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.temp_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_ours = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(TEMP_FILE_PREFIX))
                .unwrap_or(false);
            if !is_ours {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    debug!("Cleaned up: {}", path.display());
                }
                Err(e) => warn!("Failed to remove stale download {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

fn stalled(what: &str) -> UpdateError {
    UpdateError::Network(format!("timed out {}", what))
}
