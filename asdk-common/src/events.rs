//! Progress events and the broadcast EventBus
//!
//! Core operations report progress through plain callbacks; the session layer
//! forwards them here so any number of consumers (CLI output, a renderer) can
//! follow a running job without being wired into the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Processing stage shown to the user while a job is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Photo is being sent to the service
    Uploading,
    /// Remote job is being computed
    Computing,
    /// Export archive is being fetched
    Downloading,
    /// Export archive is being unpacked
    Unpacking,
    /// All work for the job finished
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Uploading => "Uploading",
            Stage::Computing => "Computing",
            Stage::Downloading => "Downloading",
            Stage::Unpacking => "Unpacking",
            Stage::Done => "Done",
        };
        f.write_str(s)
    }
}

/// ASDK event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AsdkEvent {
    /// Fresh snapshot of a remote job was fetched
    JobProgress {
        /// Self URL of the job
        job_url: String,
        /// Job kind ("avatar" or "export")
        kind: String,
        /// Raw status string reported by the service
        status: String,
        /// Progress percentage (0-100)
        progress: u8,
        /// When the snapshot was received
        timestamp: DateTime<Utc>,
    },

    /// Session moved to another processing stage
    StageChanged {
        /// New stage
        stage: Stage,
        /// When the stage changed
        timestamp: DateTime<Utc>,
    },

    /// Bytes of an export archive arrived
    DownloadProgress {
        /// URL being downloaded
        url: String,
        /// Percentage of the total size read so far (0-100)
        percent: u8,
        /// When the chunk arrived
        timestamp: DateTime<Utc>,
    },

    /// Full export finished and its files can be downloaded
    ExportReady {
        /// Self URL of the export
        export_url: String,
        /// Number of downloadable files
        files: usize,
        /// When the export was resolved
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for ASDK events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AsdkEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AsdkEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AsdkEvent,
    ) -> Result<usize, broadcast::error::SendError<AsdkEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AsdkEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
