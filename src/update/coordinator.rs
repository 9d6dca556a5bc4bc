//! Update coordinator
//!
//! Owns the state machine and drives one update cycle at a time:
//! check → (accept) → download → verify → stage. Every error is settled
//! here; callers only ever see an outcome value and the published state.

use super::applier::{RenameOnRestartApplier, StagedUpdate, StagedUpdateApplier};
use super::config::UpdaterConfig;
use super::error::{ErrorKind, Result, UpdateError};
use super::executor::DownloadExecutor;
use super::fetcher::ReleaseFetcher;
use super::notifier::{LogObserver, Severity, UpdateHandle, UpdateObserver};
use super::planner::{self, UpdateDecision};
use super::release::VersionInfo;
use super::state::{
    Cycle, DownloadProgress, StateCell, UpdateFailure, UpdateSnapshot, UpdateState,
};
use super::verifier::{self, digests_match, Assurance};
use crate::config::{ConfigResult, SettingsStore};
use crate::core::error::{ErrorRecovery, RecoveryAction};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of a check request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Another cycle is in flight; the request was ignored
    AlreadyRunning,
    NoUpdate,
    UpdateAvailable(VersionInfo),
    /// Cancelled while fetching
    Cancelled,
    Failed(ErrorKind),
}

/// Result of accepting an available update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Nothing to accept in the current state
    NotAvailable,
    ReadyToInstall(StagedUpdate),
    Cancelled,
    Failed(ErrorKind),
}

/// Result of a full background cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub check: CheckOutcome,
    /// Present when the update was downloaded automatically
    pub accept: Option<AcceptOutcome>,
}

/// Drives update cycles and owns the update state
pub struct UpdateCoordinator {
    local_version: String,
    config: UpdaterConfig,
    fetcher: ReleaseFetcher,
    executor: DownloadExecutor,
    applier: Arc<dyn StagedUpdateApplier>,
    observer: Arc<dyn UpdateObserver>,
    settings: Option<Arc<SettingsStore>>,
    state: StateCell,
    /// Release found by a check, tagged with the cycle that found it
    available: Mutex<Option<(u64, VersionInfo)>>,
}

impl UpdateCoordinator {
    /// Create a coordinator for the running build
    pub fn new(local_version: impl Into<String>, config: UpdaterConfig) -> Result<Self> {
        config.validate()?;
        let local_version = local_version.into();

        let fetcher = ReleaseFetcher::new(&config, &local_version)?;
        let executor = DownloadExecutor::new(&config, &local_version)?;
        let applier = RenameOnRestartApplier::new(
            config.staging_dir.clone(),
            config.resolve_target_exe()?,
        );

        Ok(Self {
            local_version,
            config,
            fetcher,
            executor,
            applier: Arc::new(applier),
            observer: Arc::new(LogObserver),
            settings: None,
            state: StateCell::new(),
            available: Mutex::new(None),
        })
    }

    /// Replace the default rename-on-restart applier
    pub fn with_applier(mut self, applier: Arc<dyn StagedUpdateApplier>) -> Self {
        self.applier = applier;
        self
    }

    /// Replace the default log-only observer
    pub fn with_observer(mut self, observer: Arc<dyn UpdateObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Persist last-check time and skipped versions through `store`
    pub fn with_settings_store(mut self, store: Arc<SettingsStore>) -> Self {
        self.settings = Some(store);
        self
    }

    /// Read-only handle for the presentation layer
    pub fn handle(&self) -> UpdateHandle {
        UpdateHandle::new(self.state.subscribe())
    }

    pub fn state(&self) -> UpdateState {
        self.state.state()
    }

    pub fn snapshot(&self) -> UpdateSnapshot {
        self.state.snapshot()
    }

    pub fn local_version(&self) -> &str {
        &self.local_version
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn applier(&self) -> &Arc<dyn StagedUpdateApplier> {
        &self.applier
    }

    /// Release found by the last check, while it is still actionable
    pub fn available(&self) -> Option<VersionInfo> {
        let current = self.state.cycle().id;
        match &*self.available.lock() {
            Some((cycle, info)) if *cycle == current => Some(info.clone()),
            _ => None,
        }
    }

    fn clear_available(&self, cycle: u64) {
        let mut available = self.available.lock();
        if matches!(&*available, Some((found_in, _)) if *found_in == cycle) {
            *available = None;
        }
    }

    fn transition<F>(&self, cycle: u64, next: UpdateState, mutate: F) -> bool
    where
        F: FnOnce(&mut UpdateSnapshot),
    {
        match self.state.transition(cycle, next, mutate) {
            Some(snapshot) => {
                self.observer.on_transition(&snapshot);
                true
            }
            None => {
                debug!(to = %next, "Ignoring stale transition");
                false
            }
        }
    }

    /// Settle a failed step of `cycle` into the state machine.
    ///
    /// Only the current cycle changes state or notifies the user; a worker
    /// whose cycle was cancelled just reports the kind.
    fn settle(&self, cycle: u64, err: UpdateError) -> ErrorKind {
        let kind = err.kind();
        self.clear_available(cycle);

        match &err {
            // cancel() already moved the state to Idle and retired the cycle
            UpdateError::Cancelled => debug!(cycle, "Cancelled update worker finished"),
            UpdateError::VersionParse(_) => {
                if self.transition(cycle, UpdateState::Idle, |s| s.progress = None) {
                    warn!("Could not compare versions: {}", err);
                    self.observer.on_message(
                        Severity::Warning,
                        &format!("Could not compare versions: {}", err),
                    );
                }
            }
            _ => {
                let message = err.to_string();
                let failure = UpdateFailure {
                    kind,
                    message: message.clone(),
                };
                if !self.transition(cycle, UpdateState::Failed, |s| {
                    s.progress = None;
                    s.failure = Some(failure);
                }) {
                    debug!(cycle, kind = %kind, "Dropping failure of a retired cycle");
                    return kind;
                }

                error!(kind = %kind, "Update failed: {}", err);
                let (severity, hint) = match err.recovery_action() {
                    RecoveryAction::Retry => (Severity::Warning, " Please try again later."),
                    _ => (Severity::Error, ""),
                };
                self.observer
                    .on_message(severity, &format!("Update failed: {}.{}", message, hint));
            }
        }
        kind
    }

    async fn skipped_version(&self) -> Option<String> {
        match &self.settings {
            Some(store) => store.get().await.skipped_version,
            None => None,
        }
    }

    async fn record_check(&self) {
        if let Some(store) = &self.settings {
            if let Err(e) = store.record_check(chrono::Utc::now()).await {
                warn!("Failed to record update check time: {}", e);
            }
        }
    }

    /// Check the release feed once.
    ///
    /// A no-op returning [`CheckOutcome::AlreadyRunning`] unless the state
    /// is `Idle` or `Failed`.
    pub async fn check(&self) -> CheckOutcome {
        let Some((cycle, snapshot)) = self.state.begin_check() else {
            debug!(state = %self.state(), "Update check already in progress");
            return CheckOutcome::AlreadyRunning;
        };
        *self.available.lock() = None;
        self.observer.on_transition(&snapshot);

        let fetched = tokio::select! {
            biased;
            _ = cycle.cancel.cancelled() => Err(UpdateError::Cancelled),
            fetched = self.fetcher.fetch_latest() => fetched,
        };

        let info = match fetched {
            Ok(info) => info,
            Err(UpdateError::Cancelled) => {
                self.settle(cycle.id, UpdateError::Cancelled);
                return CheckOutcome::Cancelled;
            }
            Err(e) => return CheckOutcome::Failed(self.settle(cycle.id, e)),
        };

        self.record_check().await;

        match planner::plan(&self.local_version, &info) {
            Ok(UpdateDecision::NoUpdate) => {
                info!(local = %self.local_version, remote = %info.version(), "No update available");
                self.observer
                    .on_message(Severity::Info, "You are running the latest version");
                self.transition(cycle.id, UpdateState::Idle, |_| {});
                CheckOutcome::NoUpdate
            }
            Ok(UpdateDecision::UpdateAvailable) => {
                let skipped = self.skipped_version().await;
                if planner::is_skipped(&info, skipped.as_deref()) {
                    info!(version = %info.version(), "Skipping dismissed release");
                    self.transition(cycle.id, UpdateState::Idle, |_| {});
                    return CheckOutcome::NoUpdate;
                }

                *self.available.lock() = Some((cycle.id, info.clone()));
                let version = info.version().to_string();
                if !self.transition(cycle.id, UpdateState::Available, |s| {
                    s.version = Some(version)
                }) {
                    self.clear_available(cycle.id);
                    return CheckOutcome::Cancelled;
                }

                info!(local = %self.local_version, remote = %info.version(), "Update available");
                self.observer.on_message(
                    Severity::Info,
                    &format!("Version {} is available", info.version()),
                );
                CheckOutcome::UpdateAvailable(info)
            }
            Err(e @ UpdateError::VersionParse(_)) => {
                self.settle(cycle.id, e);
                CheckOutcome::NoUpdate
            }
            Err(e) => CheckOutcome::Failed(self.settle(cycle.id, e)),
        }
    }

    /// Download, verify and stage the available update
    pub async fn accept(&self) -> AcceptOutcome {
        let cycle = self.state.cycle();
        let Some(info) = self.available() else {
            return AcceptOutcome::NotAvailable;
        };

        let size_hint = info.size_hint();
        if !self.transition(cycle.id, UpdateState::Downloading, |s| {
            s.progress = Some(DownloadProgress::new(0, size_hint));
        }) {
            return AcceptOutcome::NotAvailable;
        }

        match self.download_verify_stage(&info, &cycle).await {
            Ok(staged) => AcceptOutcome::ReadyToInstall(staged),
            Err(UpdateError::Cancelled) => {
                self.settle(cycle.id, UpdateError::Cancelled);
                AcceptOutcome::Cancelled
            }
            Err(e) => AcceptOutcome::Failed(self.settle(cycle.id, e)),
        }
    }

    async fn download_verify_stage(
        &self,
        info: &VersionInfo,
        cycle: &Cycle,
    ) -> Result<StagedUpdate> {
        let cancel = &cycle.cancel;
        let on_progress = |progress: DownloadProgress| {
            if self.state.record_progress(cycle.id, progress) {
                self.observer.on_progress(&progress);
            }
        };

        let artifact = self
            .executor
            .download_and_stage(info, cancel, &on_progress)
            .await?;

        if cancel.is_cancelled() || !self.transition(cycle.id, UpdateState::Verifying, |_| {}) {
            return Err(UpdateError::Cancelled);
        }

        let verification = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
            verified = verifier::verify(&artifact, info.expected_hash()) => verified?,
        };

        // The file on disk must still be the bytes that were streamed
        if !digests_match(artifact.hash(), &verification.computed) {
            return Err(UpdateError::Integrity {
                expected: artifact.hash().to_string(),
                actual: verification.computed,
            });
        }

        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let staged = self.applier.stage(artifact, info, &verification).await?;

        let assurance = verification.assurance;
        if !self.transition(cycle.id, UpdateState::ReadyToInstall, |s| {
            s.assurance = Some(assurance);
        }) {
            if let Err(e) = self.applier.discard().await {
                warn!("Failed to discard staged update after cancel: {}", e);
            }
            return Err(UpdateError::Cancelled);
        }

        if assurance == Assurance::Reduced {
            self.observer.on_message(
                Severity::Warning,
                "This release has no published checksum; it was not verified",
            );
        }
        self.observer.on_message(
            Severity::Info,
            &format!(
                "Version {} is ready and will be installed on restart",
                staged.version
            ),
        );

        Ok(staged)
    }

    /// Check, then download automatically when configured to
    pub async fn run_cycle(&self) -> CycleOutcome {
        let check = self.check().await;
        let accept = match &check {
            CheckOutcome::UpdateAvailable(_) if self.config.auto_download => {
                Some(self.accept().await)
            }
            _ => None,
        };
        CycleOutcome { check, accept }
    }

    /// Run [`run_cycle`](Self::run_cycle) on the runtime
    pub fn spawn_check(self: &Arc<Self>) -> JoinHandle<CycleOutcome> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run_cycle().await })
    }

    /// Run [`accept`](Self::accept) on the runtime
    pub fn spawn_accept(self: &Arc<Self>) -> JoinHandle<AcceptOutcome> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.accept().await })
    }

    /// Cancel the current cycle and return to `Idle`.
    ///
    /// Returns false when nothing was cancellable.
    pub fn cancel(&self) -> bool {
        let Some(snapshot) = self.state.cancel_to_idle() else {
            return false;
        };
        self.observer.on_transition(&snapshot);
        info!("Update cancelled by user");
        true
    }

    /// Dismiss the available release and remember it as skipped
    pub async fn skip_available(&self) -> ConfigResult<Option<String>> {
        if self.state() != UpdateState::Available {
            return Ok(None);
        }
        let Some(info) = self.available() else {
            return Ok(None);
        };
        if !self.cancel() {
            return Ok(None);
        }

        let version = info.version().to_string();
        if let Some(store) = &self.settings {
            store.set_skipped_version(Some(version.clone())).await?;
        }
        info!(version = %version, "Release skipped");
        Ok(Some(version))
    }

    /// Remove temp files left by a crashed download
    pub async fn cleanup_stale_downloads(&self) -> Result<usize> {
        self.executor.cleanup_stale().await
    }
}
