//! Staged-update applier
//!
//! A verified artifact is moved into the staging directory next to a
//! `pending.json` marker. On the next start, before the main window opens,
//! [`StagedUpdateApplier::apply_pending`] re-hashes the staged file and
//! swaps it in for the executable.
//!
//! - Windows: the running executable is renamed aside (allowed while it
//!   runs), the staged file takes its place
//! - Unix: same swap, then the executable bit is set

use super::error::{Result, UpdateError};
use super::release::{LocalArtifact, VersionInfo};
use super::verifier::{compute_digest, digests_match, Verification};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use self::windows as platform;

#[cfg(not(windows))]
mod unix;
#[cfg(not(windows))]
use self::unix as platform;

/// Marker file describing the staged update
pub const PENDING_MARKER: &str = "pending.json";

/// A verified update waiting for the next start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedUpdate {
    pub version: String,
    pub staged_path: PathBuf,
    pub sha256: String,
    pub size: u64,
    pub staged_at: DateTime<Utc>,
}

/// Result of swapping a staged update in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub version: String,
    pub target: PathBuf,
    /// Previous executable, kept until the next clean start
    pub backup: Option<PathBuf>,
}

impl AppliedUpdate {
    /// Start the new executable; the caller exits afterwards
    pub fn relaunch(&self) -> Result<()> {
        std::process::Command::new(&self.target)
            .spawn()
            .map_err(|e| UpdateError::Staging(format!("failed to relaunch: {}", e)))?;
        info!("Relaunched {}", self.target.display());
        Ok(())
    }
}

/// Installs verified artifacts
#[async_trait]
pub trait StagedUpdateApplier: Send + Sync {
    /// Move the artifact out of temp storage and record it as pending
    async fn stage(
        &self,
        artifact: LocalArtifact,
        info: &VersionInfo,
        verification: &Verification,
    ) -> Result<StagedUpdate>;

    /// Currently staged update, if any
    async fn pending(&self) -> Result<Option<StagedUpdate>>;

    /// Swap the staged update in; `Ok(None)` when nothing is staged
    async fn apply_pending(&self) -> Result<Option<AppliedUpdate>>;

    /// Drop the staged update and its marker
    async fn discard(&self) -> Result<()>;

    /// Remove the previous executable left by the last swap.
    ///
    /// Returns false when a backup exists but could not be removed, e.g. on
    /// Windows while the old process is still shutting down.
    async fn cleanup_backup(&self) -> bool;
}

/// Applier that swaps executables at the next process start
#[derive(Debug, Clone)]
pub struct RenameOnRestartApplier {
    staging_dir: PathBuf,
    target_exe: PathBuf,
}

impl RenameOnRestartApplier {
    pub fn new(staging_dir: impl Into<PathBuf>, target_exe: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            target_exe: target_exe.into(),
        }
    }

    /// A marker may only name a regular file directly inside the staging dir
    async fn is_staged_file(&self, path: &Path) -> bool {
        if path.parent() != Some(self.staging_dir.as_path()) || path.file_name().is_none() {
            return false;
        }
        match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => !meta.file_type().is_symlink(),
            Err(_) => true,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn target_exe(&self) -> &Path {
        &self.target_exe
    }

    fn marker_path(&self) -> PathBuf {
        self.staging_dir.join(PENDING_MARKER)
    }

    /// Where the previous executable is kept after a swap
    pub fn backup_path(&self) -> PathBuf {
        self.target_exe.with_extension("old")
    }

    /// Check if a backup exists
    pub fn has_backup(&self) -> bool {
        self.backup_path().exists()
    }

    async fn write_marker(&self, staged: &StagedUpdate) -> Result<()> {
        let json = serde_json::to_vec_pretty(staged)
            .map_err(|e| UpdateError::Staging(format!("failed to encode marker: {}", e)))?;
        let tmp = self.staging_dir.join(format!("{}.tmp", PENDING_MARKER));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.marker_path()).await?;
        Ok(())
    }

    async fn remove_marker(&self) -> Result<()> {
        match tokio::fs::remove_file(self.marker_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Move the staged file over the target, falling back to a copy when
    /// the two paths are on different filesystems
    async fn move_into_place(&self, staged: &Path) -> std::io::Result<()> {
        if tokio::fs::rename(staged, &self.target_exe).await.is_ok() {
            return Ok(());
        }
        tokio::fs::copy(staged, &self.target_exe).await?;
        if let Err(e) = tokio::fs::remove_file(staged).await {
            warn!("Failed to remove staged file {}: {}", staged.display(), e);
        }
        Ok(())
    }
}

#[async_trait]
impl StagedUpdateApplier for RenameOnRestartApplier {
    async fn stage(
        &self,
        artifact: LocalArtifact,
        info: &VersionInfo,
        verification: &Verification,
    ) -> Result<StagedUpdate> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        self.discard().await?;

        let size = artifact.size();
        let staged_path = self
            .staging_dir
            .join(format!("BashAndDash-{}.staged", info.version()));

        let temp_path = artifact.into_temp_path();
        if let Err(err) = temp_path.persist(&staged_path) {
            // Cross-device rename; copy, then let the TempPath delete the source
            let temp_path = err.path;
            tokio::fs::copy(&temp_path, &staged_path).await?;
            if let Err(e) = temp_path.close() {
                warn!("Failed to remove temp download: {}", e);
            }
        }

        let staged = StagedUpdate {
            version: info.version().to_string(),
            staged_path,
            sha256: verification.computed.clone(),
            size,
            staged_at: Utc::now(),
        };

        if let Err(e) = self.write_marker(&staged).await {
            let _ = tokio::fs::remove_file(&staged.staged_path).await;
            return Err(e);
        }

        info!(
            version = %staged.version,
            path = %staged.staged_path.display(),
            "Update staged; it will be applied on next start"
        );
        Ok(staged)
    }

    async fn pending(&self) -> Result<Option<StagedUpdate>> {
        let bytes = match tokio::fs::read(self.marker_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let staged: StagedUpdate = serde_json::from_slice(&bytes)
            .map_err(|e| UpdateError::Staging(format!("corrupt pending marker: {}", e)))?;
        if !self.is_staged_file(&staged.staged_path).await {
            return Err(UpdateError::Staging(format!(
                "pending marker points outside {}: {}",
                self.staging_dir.display(),
                staged.staged_path.display()
            )));
        }
        Ok(Some(staged))
    }

    async fn apply_pending(&self) -> Result<Option<AppliedUpdate>> {
        let staged = match self.pending().await {
            Ok(Some(staged)) => staged,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.remove_marker().await?;
                return Err(e);
            }
        };

        if !staged.staged_path.exists() {
            self.remove_marker().await?;
            return Err(UpdateError::Staging(format!(
                "staged file missing: {}",
                staged.staged_path.display()
            )));
        }

        let actual = compute_digest(&staged.staged_path).await?;
        if !digests_match(&actual, &staged.sha256) {
            error!(expected = %staged.sha256, actual = %actual, "Staged update was modified");
            self.discard().await?;
            return Err(UpdateError::Integrity {
                expected: staged.sha256,
                actual,
            });
        }

        let backup = self.backup_path();
        let had_target = self.target_exe.exists();
        if had_target {
            self.cleanup_backup().await;
            tokio::fs::rename(&self.target_exe, &backup).await.map_err(|e| {
                UpdateError::Staging(format!(
                    "failed to move {} aside: {}",
                    self.target_exe.display(),
                    e
                ))
            })?;
        }

        if let Err(e) = self.move_into_place(&staged.staged_path).await {
            error!("Failed to install update: {}", e);
            if had_target {
                if let Err(restore) = tokio::fs::rename(&backup, &self.target_exe).await {
                    error!("Failed to restore previous executable: {}", restore);
                }
            }
            return Err(UpdateError::Staging(format!("failed to install update: {}", e)));
        }

        platform::prepare_executable(&self.target_exe)?;
        self.remove_marker().await?;

        info!(
            version = %staged.version,
            target = %self.target_exe.display(),
            "Update applied"
        );

        Ok(Some(AppliedUpdate {
            version: staged.version,
            target: self.target_exe.clone(),
            backup: had_target.then_some(backup),
        }))
    }

    async fn discard(&self) -> Result<()> {
        if let Some(staged) = self.pending().await.ok().flatten() {
            match tokio::fs::remove_file(&staged.staged_path).await {
                Ok(()) => info!("Discarded staged update {}", staged.version),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.remove_marker().await
    }

    async fn cleanup_backup(&self) -> bool {
        let backup = self.backup_path();
        match tokio::fs::remove_file(&backup).await {
            Ok(()) => {
                info!("Cleaned up backup: {}", backup.display());
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!("Failed to remove backup {}: {}", backup.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::verifier::Assurance;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;

    fn artifact_in(dir: &Path, content: &[u8]) -> (LocalArtifact, String) {
        let mut file = tempfile::Builder::new()
            .prefix("bashdash-update-")
            .tempfile_in(dir)
            .unwrap();
        std::io::Write::write_all(&mut file, content).unwrap();
        let hash = hex::encode(Sha256::digest(content));
        let (_, path) = file.into_parts();
        (
            LocalArtifact::new(path, content.len() as u64, hash.clone()),
            hash,
        )
    }

    fn release(version: &str) -> VersionInfo {
        VersionInfo::new(
            version,
            "https://github.com/owner/repo/releases/download/v1/BashAndDash.exe",
            "notes",
            None,
            &Default::default(),
        )
        .unwrap()
    }

    fn verification(hash: &str) -> Verification {
        Verification {
            computed: hash.to_string(),
            assurance: Assurance::Full,
        }
    }

    #[tokio::test]
    async fn test_stage_writes_marker_and_moves_file() {
        let dir = TempDir::new().unwrap();
        let applier =
            RenameOnRestartApplier::new(dir.path().join("staging"), dir.path().join("app.exe"));
        let (artifact, hash) = artifact_in(dir.path(), b"new build");
        let temp = artifact.temp_path().to_path_buf();

        let staged = applier
            .stage(artifact, &release("1.2.0"), &verification(&hash))
            .await
            .unwrap();

        assert!(!temp.exists());
        assert!(staged.staged_path.exists());
        assert_eq!(staged.sha256, hash);
        assert_eq!(applier.pending().await.unwrap(), Some(staged));
    }

    #[tokio::test]
    async fn test_apply_pending_swaps_target_and_keeps_backup() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("app.exe");
        std::fs::write(&target, b"old build").unwrap();
        let applier = RenameOnRestartApplier::new(dir.path().join("staging"), &target);

        let (artifact, hash) = artifact_in(dir.path(), b"new build");
        applier
            .stage(artifact, &release("1.2.0"), &verification(&hash))
            .await
            .unwrap();

        let applied = applier.apply_pending().await.unwrap().unwrap();
        assert_eq!(applied.version, "1.2.0");
        assert_eq!(std::fs::read(&target).unwrap(), b"new build");
        assert_eq!(std::fs::read(applier.backup_path()).unwrap(), b"old build");
        assert!(applier.pending().await.unwrap().is_none());

        assert!(applier.cleanup_backup().await);
        assert!(!applier.has_backup());
    }

    #[tokio::test]
    async fn test_apply_pending_without_marker_is_noop() {
        let dir = TempDir::new().unwrap();
        let applier = RenameOnRestartApplier::new(dir.path(), dir.path().join("app.exe"));
        assert!(applier.apply_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_pending_rejects_tampered_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("app.exe");
        std::fs::write(&target, b"old build").unwrap();
        let applier = RenameOnRestartApplier::new(dir.path().join("staging"), &target);

        let (artifact, hash) = artifact_in(dir.path(), b"new build");
        let staged = applier
            .stage(artifact, &release("1.2.0"), &verification(&hash))
            .await
            .unwrap();
        std::fs::write(&staged.staged_path, b"tampered").unwrap();

        let err = applier.apply_pending().await.unwrap_err();
        assert!(matches!(err, UpdateError::Integrity { .. }));
        assert_eq!(std::fs::read(&target).unwrap(), b"old build");
        assert!(!staged.staged_path.exists());
        assert!(applier.pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_pending_rejects_marker_outside_staging_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("app.exe");
        std::fs::write(&target, b"old build").unwrap();
        let applier = RenameOnRestartApplier::new(dir.path().join("staging"), &target);

        let (artifact, hash) = artifact_in(dir.path(), b"new build");
        let mut staged = applier
            .stage(artifact, &release("1.2.0"), &verification(&hash))
            .await
            .unwrap();

        // Point the marker at a file elsewhere whose digest matches
        let outside = dir.path().join("other.exe");
        std::fs::write(&outside, b"not an update").unwrap();
        staged.staged_path = outside.clone();
        staged.sha256 = hex::encode(Sha256::digest(b"not an update"));
        std::fs::write(
            applier.staging_dir().join(PENDING_MARKER),
            serde_json::to_vec(&staged).unwrap(),
        )
        .unwrap();

        let err = applier.apply_pending().await.unwrap_err();
        assert!(matches!(err, UpdateError::Staging(_)));
        assert_eq!(std::fs::read(&target).unwrap(), b"old build");
        assert!(outside.exists());
        assert!(!applier.staging_dir().join(PENDING_MARKER).exists());
    }

    #[tokio::test]
    async fn test_discard_ignores_marker_outside_staging_dir() {
        let dir = TempDir::new().unwrap();
        let applier =
            RenameOnRestartApplier::new(dir.path().join("staging"), dir.path().join("app.exe"));
        std::fs::create_dir_all(applier.staging_dir()).unwrap();

        let outside = dir.path().join("keep.txt");
        std::fs::write(&outside, b"user data").unwrap();
        let marker = StagedUpdate {
            version: "1.2.0".to_string(),
            staged_path: applier.staging_dir().join("..").join("keep.txt"),
            sha256: hex::encode(Sha256::digest(b"user data")),
            size: 9,
            staged_at: Utc::now(),
        };
        std::fs::write(
            applier.staging_dir().join(PENDING_MARKER),
            serde_json::to_vec(&marker).unwrap(),
        )
        .unwrap();

        applier.discard().await.unwrap();
        assert!(outside.exists());
        assert!(!applier.staging_dir().join(PENDING_MARKER).exists());
    }

    #[tokio::test]
    async fn test_restaging_replaces_previous_update() {
        let dir = TempDir::new().unwrap();
        let applier =
            RenameOnRestartApplier::new(dir.path().join("staging"), dir.path().join("app.exe"));

        let (first, first_hash) = artifact_in(dir.path(), b"first");
        let first = applier
            .stage(first, &release("1.1.0"), &verification(&first_hash))
            .await
            .unwrap();

        let (second, second_hash) = artifact_in(dir.path(), b"second");
        let second = applier
            .stage(second, &release("1.2.0"), &verification(&second_hash))
            .await
            .unwrap();

        assert!(!first.staged_path.exists());
        assert!(second.staged_path.exists());
        assert_eq!(applier.pending().await.unwrap().unwrap().version, "1.2.0");
    }
}
