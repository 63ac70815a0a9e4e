//! Event stream for callers observing the engine.
//!
//! The engine emits progress counts, snapshot/restore outcomes and state
//! transitions on a broadcast channel. Subscribers receive events on the
//! worker's schedule and are responsible for marshaling them onto
//! whatever thread owns their own state.

use crate::job::JobState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum number of queued events per subscriber.
const BROADCAST_CAPACITY: usize = 256;

/// Events emitted by the engine worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    /// A snapshot attempt began.
    #[serde(rename = "snapshot:started")]
    SnapshotStarted { name: String },

    /// One unit of archive work finished.
    #[serde(rename = "snapshot:progress")]
    SnapshotProgress(ProgressPayload),

    /// A snapshot was written and kept.
    #[serde(rename = "snapshot:created")]
    SnapshotCreated {
        name: String,
        path: String,
        entries: usize,
    },

    /// A freshly written snapshot matched an existing one and was deleted.
    #[serde(rename = "snapshot:duplicate")]
    SnapshotDuplicate { name: String, kept: String },

    /// A snapshot attempt failed; the schedule continues.
    #[serde(rename = "snapshot:failed")]
    SnapshotFailed { error: String },

    /// A source entry could not be archived and was skipped.
    #[serde(rename = "snapshot:warning")]
    SnapshotWarning { path: String, message: String },

    /// A restore began.
    #[serde(rename = "restore:started")]
    RestoreStarted { archive: String },

    /// One archive member was extracted.
    #[serde(rename = "restore:progress")]
    RestoreProgress(ProgressPayload),

    /// All members were extracted.
    #[serde(rename = "restore:completed")]
    RestoreCompleted { target: String, members: usize },

    /// The restore aborted.
    #[serde(rename = "restore:failed")]
    RestoreFailed { error: String },

    /// The controller moved to a new state.
    #[serde(rename = "state:changed")]
    StateChanged { state: JobState },
}

/// Determinate progress for one archive operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_path: Option<String>,
}

/// Shared event channel between the worker and its subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// Broadcast an event to all subscribers. Events emitted while nobody
    /// is subscribed are dropped.
    pub fn emit(&self, event: EngineEvent) {
        if let Ok(count) = self.tx.send(event) {
            debug!("broadcast event to {} subscriber(s)", count);
        }
    }

    /// Subscribe to events emitted from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(EngineEvent::SnapshotStarted {
            name: "docs_2024-01-01T00-00-00.tar.zst".to_string(),
        });

        match rx.try_recv().unwrap() {
            EngineEvent::SnapshotStarted { name } => {
                assert!(name.starts_with("docs_"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = EngineEvent::SnapshotProgress(ProgressPayload {
            current: 3,
            total: 10,
            current_path: Some("docs/a.txt".to_string()),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("snapshot:progress"));
        assert!(json.contains("docs/a.txt"));
    }

    #[test]
    fn test_progress_omits_missing_path() {
        let event = EngineEvent::RestoreProgress(ProgressPayload {
            current: 0,
            total: 4,
            current_path: None,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("restore:progress"));
        assert!(!json.contains("current_path"));
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.emit(EngineEvent::SnapshotFailed {
            error: "disk full".to_string(),
        });
    }
}
