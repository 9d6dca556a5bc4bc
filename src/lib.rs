//! Bash and Dash self-updater
//!
//! This crate provides the update subsystem linked into the Bash and Dash
//! game-log analyzer:
//! - Release feed checks against an allow-listed host
//! - Bounded, cancellable artifact downloads
//! - SHA-256 verification and rename-on-restart installation
//! - Persisted update preferences and structured logging

pub mod config;
pub mod core;
pub mod logging;
pub mod update;

// Re-export commonly used items
pub use crate::config::{SettingsStore, SettingsStoreConfig, UpdaterSettings};
pub use crate::core::error::{BashDashError, Result};
pub use crate::core::runtime::{RuntimeOptions, UpdaterRuntime};
pub use logging::{LoggingConfig, LoggingSystem};
pub use update::{
    AcceptOutcome, CheckOutcome, UpdateCoordinator, UpdateHandle, UpdateSnapshot, UpdateState,
    UpdaterConfig, VersionInfo,
};
