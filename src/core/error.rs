//! Error types for the Bash and Dash updater
//!
//! Each subsystem keeps its own error enum; `BashDashError` wraps them for
//! hosts that want a single error type.

use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::update::UpdateError;
use thiserror::Error;

/// Result type alias for crate-level operations
pub type Result<T> = std::result::Result<T, BashDashError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum BashDashError {
    #[error("Update error: {0}")]
    Update(#[from] UpdateError),

    #[error("Settings error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Trait for error recovery strategies
///
/// The updater never retries on its own; these hints drive what the user
/// is told and whether a "try again" action is offered.
pub trait ErrorRecovery {
    /// Check if the error is retryable
    fn is_retryable(&self) -> bool;

    /// Get suggested retry delay in milliseconds
    fn retry_delay_ms(&self) -> Option<u64>;

    /// Get recovery action suggestion
    fn recovery_action(&self) -> RecoveryAction;
}

/// Recovery action suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Offer to try again
    Retry,
    /// Nothing to report; carry on
    Skip,
    /// Notify user and wait for input
    NotifyUser,
    /// Abort the operation
    Abort,
}

impl ErrorRecovery for UpdateError {
    fn is_retryable(&self) -> bool {
        matches!(self, UpdateError::Network(_) | UpdateError::Io(_))
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            UpdateError::Network(_) => Some(5000),
            UpdateError::Io(_) => Some(1000),
            _ => None,
        }
    }

    fn recovery_action(&self) -> RecoveryAction {
        match self {
            UpdateError::Network(_) | UpdateError::Io(_) => RecoveryAction::Retry,
            UpdateError::VersionParse(_) | UpdateError::Cancelled => RecoveryAction::Skip,
            UpdateError::MalformedResponse(_)
            | UpdateError::SizeLimitExceeded { .. }
            | UpdateError::Integrity { .. }
            | UpdateError::Staging(_) => RecoveryAction::NotifyUser,
            UpdateError::UrlRejected(_) | UpdateError::Config(_) => RecoveryAction::Abort,
        }
    }
}

impl ErrorRecovery for ConfigError {
    fn is_retryable(&self) -> bool {
        matches!(self, ConfigError::Io(_))
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            ConfigError::Io(_) => Some(1000),
            _ => None,
        }
    }

    fn recovery_action(&self) -> RecoveryAction {
        match self {
            ConfigError::Io(_) => RecoveryAction::Retry,
            ConfigError::NotFound(_) => RecoveryAction::Skip,
            ConfigError::Json(_) | ConfigError::Invalid(_) => RecoveryAction::NotifyUser,
        }
    }
}

impl ErrorRecovery for BashDashError {
    fn is_retryable(&self) -> bool {
        match self {
            BashDashError::Update(e) => e.is_retryable(),
            BashDashError::Config(e) => e.is_retryable(),
            BashDashError::Io(_) => true,
            BashDashError::Logging(_) | BashDashError::Internal(_) => false,
        }
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            BashDashError::Update(e) => e.retry_delay_ms(),
            BashDashError::Config(e) => e.retry_delay_ms(),
            BashDashError::Io(_) => Some(1000),
            _ => None,
        }
    }

    fn recovery_action(&self) -> RecoveryAction {
        match self {
            BashDashError::Update(e) => e.recovery_action(),
            BashDashError::Config(e) => e.recovery_action(),
            BashDashError::Io(_) => RecoveryAction::Retry,
            BashDashError::Logging(_) => RecoveryAction::Skip,
            BashDashError::Internal(_) => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_error_retryable() {
        let err = UpdateError::Network("connection reset".to_string());
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_ms(), Some(5000));
        assert_eq!(err.recovery_action(), RecoveryAction::Retry);

        let err = UpdateError::Integrity {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.recovery_action(), RecoveryAction::NotifyUser);

        let err = UpdateError::UrlRejected("evil.example".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.recovery_action(), RecoveryAction::Abort);

        assert_eq!(UpdateError::Cancelled.recovery_action(), RecoveryAction::Skip);
    }

    #[test]
    fn test_config_error_recovery() {
        let err = ConfigError::Invalid("empty endpoint".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.recovery_action(), RecoveryAction::NotifyUser);
    }

    #[test]
    fn test_bashdash_error_conversion() {
        let err: BashDashError = UpdateError::Network("offline".to_string()).into();
        assert!(err.is_retryable());
        assert_eq!(err.recovery_action(), RecoveryAction::Retry);

        let err: BashDashError = ConfigError::NotFound("updater.json".into()).into();
        assert!(!err.is_retryable());
        assert_eq!(err.recovery_action(), RecoveryAction::Skip);

        let err: BashDashError =
            std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.retry_delay_ms(), Some(1000));
    }

    #[test]
    fn test_error_display() {
        let err: BashDashError = UpdateError::Integrity {
            expected: "abc".to_string(),
            actual: "def".to_string(),
        }
        .into();
        let text = err.to_string();
        assert!(text.contains("abc"));
        assert!(text.contains("def"));
    }
}
