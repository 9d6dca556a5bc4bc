//! Updater startup sequence
//!
//! Called once by the host at process start, before the main window opens:
//! apply a staged update if there is one, clean up after the previous run,
//! then build the coordinator and optionally start a background check.

use super::error::Result;
use crate::config::{SettingsStore, SettingsStoreConfig};
use crate::update::{
    AppliedUpdate, CycleOutcome, RenameOnRestartApplier, StagedUpdateApplier, UpdateCoordinator,
    UpdateObserver, UpdaterConfig,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Inputs for [`UpdaterRuntime::start`]
pub struct RuntimeOptions {
    pub settings: SettingsStoreConfig,
    /// Defaults the persisted settings are applied over
    pub base_config: UpdaterConfig,
    pub observer: Option<Arc<dyn UpdateObserver>>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            settings: SettingsStoreConfig::default(),
            base_config: UpdaterConfig::default(),
            observer: None,
        }
    }
}

/// Running updater owned by the host application
pub struct UpdaterRuntime {
    coordinator: Arc<UpdateCoordinator>,
    settings: Arc<SettingsStore>,
    applied: Option<AppliedUpdate>,
    startup_check: Option<JoinHandle<CycleOutcome>>,
}

impl UpdaterRuntime {
    /// Run the startup sequence.
    ///
    /// A staged update is applied before the persisted settings are
    /// validated, so a bad `updater.json` cannot strand a verified build.
    /// When a staged update was applied, no check is started; the host
    /// should call [`AppliedUpdate::relaunch`] and exit.
    pub async fn start(local_version: &str, options: RuntimeOptions) -> Result<Self> {
        let settings = Arc::new(SettingsStore::new(options.settings).await?);
        let persisted = settings.get().await;
        let config = persisted.to_updater_config(options.base_config);

        let applier = Arc::new(RenameOnRestartApplier::new(
            config.staging_dir.clone(),
            config.resolve_target_exe()?,
        ));
        let applied = Self::apply_staged(&*applier).await;

        let mut coordinator = UpdateCoordinator::new(local_version, config)
            .map_err(|e| {
                if applied.is_some() {
                    warn!("Update applied but the updater config is invalid: {}", e);
                }
                e
            })?
            .with_applier(applier)
            .with_settings_store(Arc::clone(&settings));
        if let Some(observer) = options.observer {
            coordinator = coordinator.with_observer(observer);
        }
        let coordinator = Arc::new(coordinator);

        match coordinator.cleanup_stale_downloads().await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed stale update downloads"),
            Err(e) => warn!("Failed to clean temp downloads: {}", e),
        }

        let startup_check = if applied.is_none() && persisted.auto_check {
            Some(coordinator.spawn_check())
        } else {
            None
        };

        Ok(Self {
            coordinator,
            settings,
            applied,
            startup_check,
        })
    }

    /// Swap in a staged update, or remove the backup of the last one
    async fn apply_staged(applier: &dyn StagedUpdateApplier) -> Option<AppliedUpdate> {
        match applier.apply_pending().await {
            Ok(Some(applied)) => {
                info!(version = %applied.version, "Staged update applied");
                Some(applied)
            }
            Ok(None) => {
                applier.cleanup_backup().await;
                None
            }
            Err(e) => {
                warn!("Failed to apply staged update: {}", e);
                None
            }
        }
    }

    pub fn coordinator(&self) -> &Arc<UpdateCoordinator> {
        &self.coordinator
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Update swapped in during this start, if any
    pub fn applied(&self) -> Option<&AppliedUpdate> {
        self.applied.as_ref()
    }

    /// Background check started by `auto_check`
    pub fn take_startup_check(&mut self) -> Option<JoinHandle<CycleOutcome>> {
        self.startup_check.take()
    }
}
