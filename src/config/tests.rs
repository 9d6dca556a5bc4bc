//! Tests for Settings Module

use super::*;
use crate::update::UpdaterConfig;
use tempfile::TempDir;

/// Create a test settings store with temporary directory
async fn create_test_store() -> (SettingsStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let options = SettingsStoreConfig {
        settings_path: temp_dir.path().join("BashAndDash").join("updater.json"),
        create_default: true,
    };

    let store = SettingsStore::new(options).await.unwrap();
    (store, temp_dir)
}

#[tokio::test]
async fn test_create_default_settings() {
    let (store, _temp) = create_test_store().await;

    let settings = store.get().await;
    assert_eq!(settings.version, 1);
    assert!(settings.auto_check);
    assert!(!settings.auto_download);
    assert!(settings.last_check.is_none());
    assert!(settings.skipped_version.is_none());
    assert!(settings.allowed_hosts.contains(&"api.github.com".to_string()));
    assert!(store.settings_path().exists());
}

#[tokio::test]
async fn test_missing_file_without_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let options = SettingsStoreConfig {
        settings_path: temp_dir.path().join("updater.json"),
        create_default: false,
    };

    let result = SettingsStore::new(options).await;
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[tokio::test]
async fn test_update_persists_across_reopen() {
    let (store, temp) = create_test_store().await;

    let updated = store
        .update(|settings| {
            settings.auto_download = true;
            settings.skipped_version = Some("1.2.0".to_string());
        })
        .await
        .unwrap();
    assert!(updated.auto_download);

    let reopened = SettingsStore::new(SettingsStoreConfig {
        settings_path: temp.path().join("BashAndDash").join("updater.json"),
        create_default: false,
    })
    .await
    .unwrap();

    let settings = reopened.get().await;
    assert!(settings.auto_download);
    assert_eq!(settings.skipped_version.as_deref(), Some("1.2.0"));
}

#[tokio::test]
async fn test_write_leaves_no_temp_file() {
    let (store, _temp) = create_test_store().await;

    store.set_auto_check(false).await.unwrap();

    let temp_path = store.settings_path().with_extension("json.tmp");
    assert!(!temp_path.exists());
}

#[tokio::test]
async fn test_invalid_update_is_rejected_and_not_applied() {
    let (store, _temp) = create_test_store().await;

    let result = store.update(|settings| settings.allowed_hosts.clear()).await;
    assert!(matches!(result, Err(ConfigError::Invalid(_))));

    let settings = store.get().await;
    assert!(!settings.allowed_hosts.is_empty());
}

#[tokio::test]
async fn test_record_check_and_skip() {
    let (store, _temp) = create_test_store().await;

    let now = chrono::Utc::now();
    let settings = store.record_check(now).await.unwrap();
    assert_eq!(settings.last_check, Some(now));

    let settings = store.set_skipped_version(Some("2.0.0".into())).await.unwrap();
    assert_eq!(settings.skipped_version.as_deref(), Some("2.0.0"));

    let settings = store.set_skipped_version(None).await.unwrap();
    assert!(settings.skipped_version.is_none());
}

#[tokio::test]
async fn test_reset_settings() {
    let (store, _temp) = create_test_store().await;

    store.set_auto_download(true).await.unwrap();

    let reset = store.reset().await.unwrap();
    assert!(!reset.auto_download);
    assert!(reset.auto_check);
}

#[test]
fn test_missing_fields_use_defaults() {
    let settings: UpdaterSettings =
        serde_json::from_str(r#"{"auto_download": true}"#).unwrap();

    assert!(settings.auto_download);
    assert!(settings.auto_check);
    assert_eq!(settings.version, 1);
    assert!(!settings.endpoint.is_empty());
}

#[test]
fn test_to_updater_config_overrides_feed() {
    let settings = UpdaterSettings {
        endpoint: "https://example.com/latest.json".to_string(),
        allowed_hosts: vec!["example.com".to_string()],
        auto_download: true,
        ..UpdaterSettings::default()
    };

    let base = UpdaterConfig::default();
    let io_timeout = base.io_timeout;
    let config = settings.to_updater_config(base);

    assert_eq!(config.endpoint, "https://example.com/latest.json");
    assert_eq!(config.allowed_hosts, vec!["example.com".to_string()]);
    assert!(config.auto_download);
    assert_eq!(config.io_timeout, io_timeout);
    assert!(config.validate().is_ok());
}
