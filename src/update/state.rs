//! Update state machine
//!
//! `StateCell` is the only place the state is mutated. Every change is a
//! checked transition taken under one lock, so the single-flight check
//! (`Idle|Failed -> Checking`) is a compare-and-set.

use super::error::ErrorKind;
use super::verifier::Assurance;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one update cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateState {
    /// No update activity
    Idle,
    /// Fetching release metadata
    Checking,
    /// Newer release found, waiting for acceptance
    Available,
    /// Downloading the artifact to a temp file
    Downloading,
    /// Hashing the downloaded artifact
    Verifying,
    /// Artifact staged; applied on next start
    ReadyToInstall,
    /// Cycle ended with an error
    Failed,
}

impl UpdateState {
    /// Whether a new check may start from this state
    pub fn can_begin_check(&self) -> bool {
        matches!(self, UpdateState::Idle | UpdateState::Failed)
    }

    /// Check if the state allows cancellation
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            UpdateState::Checking
                | UpdateState::Available
                | UpdateState::Downloading
                | UpdateState::Verifying
        )
    }

    /// Work is in flight on the background task
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            UpdateState::Checking | UpdateState::Downloading | UpdateState::Verifying
        )
    }

    /// Only a process restart leaves this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdateState::ReadyToInstall)
    }

    /// Allowed edges of the state machine
    pub fn can_transition_to(&self, next: UpdateState) -> bool {
        use UpdateState::*;
        matches!(
            (*self, next),
            (Idle, Checking)
                | (Failed, Checking)
                | (Checking, Available)
                | (Checking, Idle)
                | (Checking, Failed)
                | (Available, Downloading)
                | (Available, Idle)
                | (Downloading, Verifying)
                | (Downloading, Failed)
                | (Downloading, Idle)
                | (Verifying, ReadyToInstall)
                | (Verifying, Failed)
                | (Verifying, Idle)
        )
    }
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::Available => "available",
            UpdateState::Downloading => "downloading",
            UpdateState::Verifying => "verifying",
            UpdateState::ReadyToInstall => "ready_to_install",
            UpdateState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Reason retained while in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Download progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Bytes downloaded so far
    pub downloaded: u64,
    /// Total bytes, when the server sent a length
    pub total: Option<u64>,
    /// Download percentage (0-100), 0 when total is unknown
    pub percentage: u8,
}

impl DownloadProgress {
    pub fn new(downloaded: u64, total: Option<u64>) -> Self {
        let percentage = total
            .map(|t| Self::calculate_percentage(downloaded, t))
            .unwrap_or(0);
        Self {
            downloaded,
            total,
            percentage,
        }
    }

    /// Percentage clamped to 0..=100
    pub fn calculate_percentage(downloaded: u64, total: u64) -> u8 {
        if total == 0 {
            return 0;
        }
        let pct = (downloaded as u128 * 100) / total as u128;
        pct.min(100) as u8
    }
}

/// Read-only view of the subsystem handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSnapshot {
    pub state: UpdateState,
    /// Remote version once known
    pub version: Option<String>,
    pub progress: Option<DownloadProgress>,
    pub assurance: Option<Assurance>,
    pub failure: Option<UpdateFailure>,
}

impl UpdateSnapshot {
    pub fn idle() -> Self {
        Self {
            state: UpdateState::Idle,
            version: None,
            progress: None,
            assurance: None,
            failure: None,
        }
    }
}

impl Default for UpdateSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

/// Identity of one update cycle.
///
/// A cycle starts at `begin_check` and ends at the next cancel or check.
/// Workers carry their cycle and the cell refuses changes from any other.
#[derive(Debug, Clone)]
pub(crate) struct Cycle {
    pub(crate) id: u64,
    pub(crate) cancel: CancellationToken,
}

struct CellInner {
    snapshot: UpdateSnapshot,
    cycle: Cycle,
}

/// Owned state storage with change publication
pub(crate) struct StateCell {
    inner: Mutex<CellInner>,
    publisher: watch::Sender<UpdateSnapshot>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (publisher, _) = watch::channel(UpdateSnapshot::idle());
        Self {
            inner: Mutex::new(CellInner {
                snapshot: UpdateSnapshot::idle(),
                cycle: Cycle {
                    id: 0,
                    cancel: CancellationToken::new(),
                },
            }),
            publisher,
        }
    }

    pub(crate) fn snapshot(&self) -> UpdateSnapshot {
        self.inner.lock().snapshot.clone()
    }

    pub(crate) fn state(&self) -> UpdateState {
        self.inner.lock().snapshot.state
    }

    /// Current cycle, for a worker joining it (e.g. accept after check)
    pub(crate) fn cycle(&self) -> Cycle {
        self.inner.lock().cycle.clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<UpdateSnapshot> {
        self.publisher.subscribe()
    }

    /// Compare-and-set `Idle|Failed -> Checking`; starts a new cycle
    pub(crate) fn begin_check(&self) -> Option<(Cycle, UpdateSnapshot)> {
        let mut inner = self.inner.lock();
        if !inner.snapshot.state.can_begin_check() {
            return None;
        }
        inner.cycle = Cycle {
            id: inner.cycle.id.wrapping_add(1),
            cancel: CancellationToken::new(),
        };
        inner.snapshot = UpdateSnapshot {
            state: UpdateState::Checking,
            ..UpdateSnapshot::idle()
        };
        self.publisher.send_replace(inner.snapshot.clone());
        Some((inner.cycle.clone(), inner.snapshot.clone()))
    }

    /// Take the edge `current -> next` on behalf of cycle `cycle`.
    ///
    /// Returns `None` when the edge is invalid or the cycle is no longer
    /// current, e.g. a worker reporting a result after it was cancelled.
    pub(crate) fn transition<F>(
        &self,
        cycle: u64,
        next: UpdateState,
        mutate: F,
    ) -> Option<UpdateSnapshot>
    where
        F: FnOnce(&mut UpdateSnapshot),
    {
        let mut inner = self.inner.lock();
        if inner.cycle.id != cycle || !inner.snapshot.state.can_transition_to(next) {
            return None;
        }
        inner.snapshot.state = next;
        mutate(&mut inner.snapshot);
        self.publisher.send_replace(inner.snapshot.clone());
        Some(inner.snapshot.clone())
    }

    /// Move to `Idle` from any cancellable state and trip the cycle's token.
    ///
    /// The cycle id is retired so its workers can no longer change state.
    pub(crate) fn cancel_to_idle(&self) -> Option<UpdateSnapshot> {
        let mut inner = self.inner.lock();
        if !inner.snapshot.state.can_cancel() {
            return None;
        }
        inner.cycle.cancel.cancel();
        inner.cycle = Cycle {
            id: inner.cycle.id.wrapping_add(1),
            cancel: CancellationToken::new(),
        };
        inner.snapshot = UpdateSnapshot::idle();
        self.publisher.send_replace(inner.snapshot.clone());
        Some(inner.snapshot.clone())
    }

    /// Record progress while downloading; ignored in any other state
    pub(crate) fn record_progress(&self, cycle: u64, progress: DownloadProgress) -> bool {
        let mut inner = self.inner.lock();
        if inner.cycle.id != cycle || inner.snapshot.state != UpdateState::Downloading {
            return false;
        }
        inner.snapshot.progress = Some(progress);
        self.publisher.send_replace(inner.snapshot.clone());
        true
    }
}
