//! Submission progress events
//!
//! An in-process bus built on `tokio::sync::broadcast`. The posting pipeline
//! publishes every state transition of a submission here, so a UI shell can
//! show "Uploading 2 of 4" without the pipeline knowing anything about the
//! UI.
//!
//! Emitting never blocks and never fails: with no subscribers the event is
//! dropped, and a lagging subscriber loses the oldest events first.
//!
//! # Example
//!
//! ```no_run
//! use libskycast::service::events::{Event, EventBus, SubmissionState};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::StateChanged {
//!     submission_id: "abc123".to_string(),
//!     state: SubmissionState::UploadingMedia,
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::FailureKind;

pub type EventReceiver = broadcast::Receiver<Event>;

/// Default per-subscriber buffer
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    /// Number of live receivers; for diagnostics only
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Where a submission is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Authenticating,
    UploadingMedia,
    CreatingRecord,
    Succeeded,
    Failed,
}

impl SubmissionState {
    /// No further transitions happen from this state
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionState::Succeeded | SubmissionState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SubmissionStarted {
        submission_id: String,
        image_count: usize,
    },

    StateChanged {
        submission_id: String,
        state: SubmissionState,
    },

    /// One image finished encoding
    MediaEncoded {
        submission_id: String,
        /// Position of the image in the request
        index: usize,
        size_bytes: usize,
        quality: u8,
        scale: f32,
        /// False when even the smallest candidate was over budget
        within_budget: bool,
    },

    BlobUploaded {
        submission_id: String,
        index: usize,
    },

    SubmissionSucceeded {
        submission_id: String,
        uri: String,
    },

    SubmissionFailed {
        submission_id: String,
        kind: FailureKind,
        error: String,
    },
}

impl Event {
    pub fn submission_id(&self) -> &str {
        match self {
            Event::SubmissionStarted { submission_id, .. }
            | Event::StateChanged { submission_id, .. }
            | Event::MediaEncoded { submission_id, .. }
            | Event::BlobUploaded { submission_id, .. }
            | Event::SubmissionSucceeded { submission_id, .. }
            | Event::SubmissionFailed { submission_id, .. } => submission_id,
        }
    }
}
