//! Updater Settings Storage
//!
//! JSON file holding the user's update preferences:
//! - Atomic writes using temp file + rename
//! - Thread-safe access via RwLock
//! - Default settings generated on first start

use crate::update::{UpdaterConfig, DEFAULT_ALLOWED_HOSTS, DEFAULT_UPDATE_ENDPOINT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Settings error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Settings result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings store options
#[derive(Debug, Clone)]
pub struct SettingsStoreConfig {
    /// Path to the settings file
    pub settings_path: PathBuf,
    /// Whether to create default settings if the file does not exist
    pub create_default: bool,
}

impl Default for SettingsStoreConfig {
    fn default() -> Self {
        let app_data = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("BashAndDash");

        Self {
            settings_path: app_data.join("updater.json"),
            create_default: true,
        }
    }
}

/// Persisted update preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterSettings {
    /// Settings format version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Release feed URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Hosts the updater may contact
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Check for updates on startup
    #[serde(default = "default_true")]
    pub auto_check: bool,

    /// Download without asking once an update is found
    #[serde(default)]
    pub auto_download: bool,

    /// Time of the last completed check
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,

    /// Release the user chose to skip
    #[serde(default)]
    pub skipped_version: Option<String>,

    #[serde(default = "default_timestamp")]
    pub last_modified: String,
}

fn default_version() -> u32 {
    1
}

fn default_endpoint() -> String {
    DEFAULT_UPDATE_ENDPOINT.to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_timestamp() -> String {
    Utc::now().to_rfc3339()
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            version: default_version(),
            endpoint: default_endpoint(),
            allowed_hosts: default_allowed_hosts(),
            auto_check: true,
            auto_download: false,
            last_check: None,
            skipped_version: None,
            last_modified: default_timestamp(),
        }
    }
}

impl UpdaterSettings {
    /// Basic sanity checks before the settings are saved or used
    pub fn validate(&self) -> ConfigResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".to_string()));
        }
        if self.allowed_hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "allowed_hosts must name at least one host".to_string(),
            ));
        }
        Ok(())
    }

    /// Runtime configuration with these preferences applied over `base`
    pub fn to_updater_config(&self, base: UpdaterConfig) -> UpdaterConfig {
        UpdaterConfig {
            endpoint: self.endpoint.clone(),
            allowed_hosts: self.allowed_hosts.clone(),
            auto_download: self.auto_download,
            ..base
        }
    }
}

/// Settings store with thread-safe access
pub struct SettingsStore {
    settings: Arc<RwLock<UpdaterSettings>>,
    options: SettingsStoreConfig,
}

impl SettingsStore {
    /// Open the settings file, creating it with defaults when allowed
    pub async fn new(options: SettingsStoreConfig) -> ConfigResult<Self> {
        if let Some(parent) = options.settings_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let settings = if options.settings_path.exists() {
            Self::load_from_file(&options.settings_path).await?
        } else if options.create_default {
            let defaults = UpdaterSettings::default();
            Self::save_to_file(&options.settings_path, &defaults).await?;
            defaults
        } else {
            return Err(ConfigError::NotFound(options.settings_path.clone()));
        };

        Ok(Self {
            settings: Arc::new(RwLock::new(settings)),
            options,
        })
    }

    async fn load_from_file(path: &Path) -> ConfigResult<UpdaterSettings> {
        let content = tokio::fs::read_to_string(path).await?;
        let settings: UpdaterSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings with an atomic write
    async fn save_to_file(path: &Path, settings: &UpdaterSettings) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(settings)?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, path).await?;

        Ok(())
    }

    /// Current settings (read-only copy)
    pub async fn get(&self) -> UpdaterSettings {
        self.settings.read().await.clone()
    }

    /// Modify and persist the settings
    pub async fn update<F>(&self, updater: F) -> ConfigResult<UpdaterSettings>
    where
        F: FnOnce(&mut UpdaterSettings),
    {
        let mut settings = self.settings.write().await;

        let mut next = settings.clone();
        updater(&mut next);
        next.validate()?;
        next.last_modified = Utc::now().to_rfc3339();

        Self::save_to_file(&self.options.settings_path, &next).await?;
        *settings = next;

        Ok(settings.clone())
    }

    /// Reset to default settings
    pub async fn reset(&self) -> ConfigResult<UpdaterSettings> {
        self.update(|settings| *settings = UpdaterSettings::default())
            .await
    }

    /// Record a completed check
    pub async fn record_check(&self, at: DateTime<Utc>) -> ConfigResult<UpdaterSettings> {
        self.update(|settings| settings.last_check = Some(at)).await
    }

    /// Remember (or clear) the release the user skipped
    pub async fn set_skipped_version(
        &self,
        version: Option<String>,
    ) -> ConfigResult<UpdaterSettings> {
        self.update(|settings| settings.skipped_version = version).await
    }

    pub async fn set_auto_check(&self, enabled: bool) -> ConfigResult<UpdaterSettings> {
        self.update(|settings| settings.auto_check = enabled).await
    }

    pub async fn set_auto_download(&self, enabled: bool) -> ConfigResult<UpdaterSettings> {
        self.update(|settings| settings.auto_download = enabled).await
    }

    /// Get settings file path
    pub fn settings_path(&self) -> &Path {
        &self.options.settings_path
    }
}
