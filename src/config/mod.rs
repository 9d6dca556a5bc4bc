//! Settings Module for the Bash and Dash updater
//!
//! Persists the user's update preferences in a single JSON file:
//! - Atomic writes
//! - Thread-safe access
//! - Conversion into the runtime `UpdaterConfig`

mod storage;
#[cfg(test)]
mod tests;

pub use storage::{
    ConfigError, ConfigResult, SettingsStore, SettingsStoreConfig, UpdaterSettings,
};
