//! Tests for the logging system

use super::*;
use tempfile::TempDir;

#[test]
fn test_log_level_display() {
    assert_eq!(LogLevel::Trace.to_string(), "trace");
    assert_eq!(LogLevel::Debug.to_string(), "debug");
    assert_eq!(LogLevel::Info.to_string(), "info");
    assert_eq!(LogLevel::Warn.to_string(), "warn");
    assert_eq!(LogLevel::Error.to_string(), "error");
}

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert_eq!(config.level, LogLevel::Info);
    assert_eq!(config.format, LogFormat::Text);
    assert_eq!(config.output, LogOutput::Both);
    assert_eq!(config.rotation, LogRotation::Daily);
    assert_eq!(config.file_name, "bashdash-updater.log");
    assert!(config.include_target);
    assert!(!config.include_thread_id);
    assert!(!config.include_file_info);
}

#[test]
fn test_logging_config_builder() {
    let config = LoggingConfig::new()
        .with_level(LogLevel::Debug)
        .with_format(LogFormat::Json)
        .with_output(LogOutput::File)
        .with_rotation(LogRotation::Never, 0)
        .with_module_level("bashdash_updater::update::executor", LogLevel::Trace);

    assert_eq!(config.level, LogLevel::Debug);
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.output, LogOutput::File);
    assert_eq!(config.rotation, LogRotation::Never);
    assert_eq!(config.max_files, 0);
    assert_eq!(
        config
            .module_levels
            .get("bashdash_updater::update::executor"),
        Some(&LogLevel::Trace)
    );
}

#[test]
fn test_logging_config_presets() {
    let dev = LoggingConfig::development();
    assert_eq!(dev.level, LogLevel::Debug);
    assert_eq!(dev.output, LogOutput::Console);
    assert!(dev.log_directory.is_none());

    let prod = LoggingConfig::production();
    assert_eq!(prod.format, LogFormat::Json);
    assert_eq!(prod.output, LogOutput::Both);
    assert_eq!(prod.max_files, 14);
}

#[test]
fn test_logging_config_deserialize_partial() {
    let config: LoggingConfig = serde_json::from_str(
        r#"{"level":"warn","format":"json","output":"console","log_directory":null}"#,
    )
    .unwrap();

    assert_eq!(config.level, LogLevel::Warn);
    assert_eq!(config.file_name, "bashdash-updater.log");
    assert_eq!(config.rotation, LogRotation::Daily);
    assert!(config.include_target);
}

#[test]
fn test_env_filter_includes_module_levels() {
    let config = LoggingConfig::new()
        .with_level(LogLevel::Warn)
        .with_module_level("bashdash_updater::update", LogLevel::Debug);

    let filter = LoggingSystem::build_env_filter(&config).to_string();
    assert!(filter.contains("warn"));
    assert!(filter.contains("bashdash_updater::update=debug"));
}

#[test]
fn test_build_appender_in_temp_dir() {
    let temp = TempDir::new().unwrap();
    let config = LoggingConfig::new().with_log_directory(temp.path().to_path_buf());

    let appender = LoggingSystem::build_appender(&config, temp.path());
    assert!(appender.is_ok());
}
