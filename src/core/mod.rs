//! Bash and Dash updater core
//!
//! - Crate-wide error type and recovery hints
//! - Startup sequence that wires settings, applier and coordinator

pub mod error;
pub mod runtime;

// Re-export commonly used items
pub use error::{BashDashError, ErrorRecovery, RecoveryAction, Result};
pub use runtime::{RuntimeOptions, UpdaterRuntime};
