//! Presentation-layer adapter
//!
//! The coordinator pushes transitions and human-readable messages into an
//! [`UpdateObserver`]. The UI can also poll the latest snapshot through an
//! [`UpdateHandle`], which has no way to mutate state.

use super::state::{DownloadProgress, UpdateSnapshot, UpdateState};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

/// Message severity for user-facing notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Receives update lifecycle events
pub trait UpdateObserver: Send + Sync {
    /// Called after every state transition
    fn on_transition(&self, snapshot: &UpdateSnapshot);

    /// Called with throttled download progress
    fn on_progress(&self, _progress: &DownloadProgress) {}

    /// Non-blocking notification for the user
    fn on_message(&self, severity: Severity, message: &str);
}

/// Observer that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl UpdateObserver for LogObserver {
    fn on_transition(&self, snapshot: &UpdateSnapshot) {
        tracing::debug!(state = %snapshot.state, version = ?snapshot.version, "Update state changed");
    }

    fn on_message(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }
    }
}

/// Event forwarded by [`ChannelNotifier`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateEvent {
    Transition(UpdateSnapshot),
    Progress(DownloadProgress),
    Message { severity: Severity, text: String },
}

/// Observer that forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<UpdateEvent>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver the UI thread drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UpdateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: UpdateEvent) {
        // A closed UI is not an error for the updater
        let _ = self.tx.send(event);
    }
}

impl UpdateObserver for ChannelNotifier {
    fn on_transition(&self, snapshot: &UpdateSnapshot) {
        self.send(UpdateEvent::Transition(snapshot.clone()));
    }

    fn on_progress(&self, progress: &DownloadProgress) {
        self.send(UpdateEvent::Progress(*progress));
    }

    fn on_message(&self, severity: Severity, message: &str) {
        self.send(UpdateEvent::Message {
            severity,
            text: message.to_string(),
        });
    }
}

/// Read-only handle on the current update state
#[derive(Debug, Clone)]
pub struct UpdateHandle {
    rx: watch::Receiver<UpdateSnapshot>,
}

impl UpdateHandle {
    pub(crate) fn new(rx: watch::Receiver<UpdateSnapshot>) -> Self {
        Self { rx }
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> UpdateSnapshot {
        self.rx.borrow().clone()
    }

    pub fn state(&self) -> UpdateState {
        self.rx.borrow().state
    }

    /// Wait for the next published change
    pub async fn changed(&mut self) -> Option<UpdateSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the state equals `target`
    pub async fn wait_for_state(&mut self, target: UpdateState) -> Option<UpdateSnapshot> {
        self.rx
            .wait_for(|snapshot| snapshot.state == target)
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}
