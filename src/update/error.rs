//! Error types for the update subsystem

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for self-update operations
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed release metadata: {0}")]
    MalformedResponse(String),

    #[error("Invalid version format: {0}")]
    VersionParse(String),

    #[error("Download size {size} bytes outside allowed range {min}..={max}")]
    SizeLimitExceeded { size: u64, min: u64, max: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("URL rejected by host allow-list: {0}")]
    UrlRejected(String),

    #[error("Update cancelled")]
    Cancelled,

    #[error("Failed to stage update: {0}")]
    Staging(String),

    #[error("Invalid updater configuration: {0}")]
    Config(String),
}

impl UpdateError {
    /// Coarse classification used in state snapshots and notifications
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpdateError::Network(_) => ErrorKind::Network,
            UpdateError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            UpdateError::VersionParse(_) => ErrorKind::VersionParse,
            UpdateError::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            UpdateError::Io(_) => ErrorKind::Io,
            UpdateError::Integrity { .. } => ErrorKind::Integrity,
            UpdateError::UrlRejected(_) => ErrorKind::UrlRejected,
            UpdateError::Cancelled => ErrorKind::Cancelled,
            UpdateError::Staging(_) => ErrorKind::Staging,
            UpdateError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_redirect() {
            let target = err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "redirect target".to_string());
            return UpdateError::UrlRejected(format!("{}: {}", target, err));
        }
        if err.is_decode() {
            return UpdateError::MalformedResponse(err.to_string());
        }
        if err.is_timeout() {
            return UpdateError::Network(format!("request timed out: {}", err));
        }
        UpdateError::Network(err.to_string())
    }
}

/// Result type for update operations
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Copyable error classification retained in `Failed` state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    MalformedResponse,
    VersionParse,
    SizeLimitExceeded,
    Io,
    Integrity,
    UrlRejected,
    Cancelled,
    Staging,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::VersionParse => "version_parse",
            ErrorKind::SizeLimitExceeded => "size_limit_exceeded",
            ErrorKind::Io => "io",
            ErrorKind::Integrity => "integrity",
            ErrorKind::UrlRejected => "url_rejected",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Staging => "staging",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}
