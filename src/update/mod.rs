//! Update module for Bash and Dash
//!
//! This module provides functionality for:
//! - Checking an allow-listed release feed for a newer version
//! - Bounded, cancellable download into a scoped temp file
//! - SHA-256 verification of the downloaded executable
//! - Staging the verified build and swapping it in on the next start

pub mod applier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod notifier;
pub mod planner;
pub mod policy;
pub mod release;
pub mod state;
pub mod verifier;
pub mod version;


pub use applier::{AppliedUpdate, RenameOnRestartApplier, StagedUpdate, StagedUpdateApplier};
pub use config::{UpdaterConfig, DEFAULT_UPDATE_ENDPOINT};
pub use coordinator::{AcceptOutcome, CheckOutcome, CycleOutcome, UpdateCoordinator};
pub use error::{ErrorKind, UpdateError};
pub use executor::DownloadExecutor;
pub use fetcher::ReleaseFetcher;
pub use notifier::{
    ChannelNotifier, LogObserver, Severity, UpdateEvent, UpdateHandle, UpdateObserver,
};
pub use planner::{plan, UpdateDecision};
pub use policy::{HostAllowList, DEFAULT_ALLOWED_HOSTS};
pub use release::{LocalArtifact, VersionInfo};
pub use state::{DownloadProgress, UpdateFailure, UpdateSnapshot, UpdateState};
pub use verifier::{verify_digest, Assurance, Verification};
pub use version::{BumpKind, Version};
