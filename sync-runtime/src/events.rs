//! # Event Bus System
//!
//! Typed notification surface for the synchronizer, built on
//! `tokio::sync::broadcast`. The engine emits a [`SyncEvent`] at every phase
//! transition; hosts subscribe to drive UI, diagnostics, or scheduling
//! without holding a reference into the engine.
//!
//! ## Usage
//!
//! ```rust
//! use sync_runtime::events::{EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut subscriber = bus.subscribe();
//!
//! bus.emit(SyncEvent::WillSynchronize).ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event, SyncEvent::WillSynchronize);
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `recv()` yields `RecvError::Lagged(n)` when a subscriber misses `n`
//! events (non-fatal) and `RecvError::Closed` when every sender is gone.
//! Emitting with no subscribers returns an error the engine ignores.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Event Types
// ============================================================================

/// Events emitted at the synchronizer's phase transitions.
///
/// Zone identifiers are carried in display form (`owner:zone_name`) so the
/// events stay serializable for host bridges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A synchronization session is starting.
    WillSynchronize,
    /// The fetch phase is starting: remote deltas are about to be downloaded.
    WillFetchChanges,
    /// Record changes for one zone are about to be fetched.
    WillFetchZoneChanges {
        /// Zone being fetched.
        zone_id: String,
    },
    /// The upload phase is starting: local changes are about to be pushed.
    WillUploadChanges,
    /// Dirty records for one zone are about to be uploaded. Emitted at most
    /// once per zone per session.
    WillUploadZoneChanges {
        /// Zone being uploaded.
        zone_id: String,
    },
    /// The session finished successfully.
    DidSynchronize,
    /// The session finished with an error.
    DidFailToSynchronize {
        /// Human-readable error message.
        message: String,
    },
    /// A model adapter was created for a newly discovered zone.
    AdapterAdded {
        /// Zone the adapter manages.
        zone_id: String,
    },
    /// The backend reported a zone deleted; its adapter was removed.
    ZoneDeleted {
        /// Zone that was deleted.
        zone_id: String,
    },
}

impl SyncEvent {
    /// Human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            SyncEvent::WillSynchronize => "Synchronization starting",
            SyncEvent::WillFetchChanges => "Fetching remote changes",
            SyncEvent::WillFetchZoneChanges { .. } => "Fetching zone changes",
            SyncEvent::WillUploadChanges => "Uploading local changes",
            SyncEvent::WillUploadZoneChanges { .. } => "Uploading zone changes",
            SyncEvent::DidSynchronize => "Synchronization completed",
            SyncEvent::DidFailToSynchronize { .. } => "Synchronization failed",
            SyncEvent::AdapterAdded { .. } => "Adapter added for new zone",
            SyncEvent::ZoneDeleted { .. } => "Zone deleted",
        }
    }

    /// Severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            SyncEvent::DidFailToSynchronize { .. } => EventSeverity::Error,
            SyncEvent::DidSynchronize | SyncEvent::ZoneDeleted { .. } => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to sync events.
///
/// Multiple producers (clone the bus), multiple independent consumers (each
/// `subscribe()` creates a receiver), non-blocking sends, lagging detection.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events, it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when there are none.
    pub fn emit(&self, event: SyncEvent) -> Result<usize, SendError<SyncEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
