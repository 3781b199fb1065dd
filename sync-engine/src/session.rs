//! Synchronization session state.

use std::collections::HashSet;
use sync_traits::RecordZoneId;
use tokio_util::sync::CancellationToken;

/// Phase of the synchronization state machine.
///
/// ```text
/// Idle → Fetching → Merging → Uploading → TokenReconciling → Idle
///            │          │         │              │
///            └──────────┴────┬────┴──────────────┘
///                            ↓
///                    Failed / Cancelled
/// ```
///
/// Download-only sessions skip `Uploading` and `TokenReconciling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No session is active.
    Idle,
    /// Downloading remote deltas.
    Fetching,
    /// Committing fetched changes into the local stores.
    Merging,
    /// Pushing local deltas.
    Uploading,
    /// Confirming no remote writes landed during upload.
    TokenReconciling,
    /// The session ended with an error.
    Failed,
    /// The session observed its cancellation flag.
    Cancelled,
}

impl SyncPhase {
    /// True for phases that do synchronization work.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncPhase::Fetching
                | SyncPhase::Merging
                | SyncPhase::Uploading
                | SyncPhase::TokenReconciling
        )
    }

    /// True for end states of a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Failed | SyncPhase::Cancelled)
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Merging => "merging",
            SyncPhase::Uploading => "uploading",
            SyncPhase::TokenReconciling => "token-reconciling",
            SyncPhase::Failed => "failed",
            SyncPhase::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Transient state of one `synchronize` call.
///
/// Exactly one session exists at a time; it is created when a synchronization
/// is accepted and cleared by the finish path.
pub(crate) struct SyncSession {
    /// Current phase, for introspection and logging.
    pub phase: SyncPhase,
    /// Set by `cancel_synchronization`; observed at phase boundaries.
    pub cancelled: bool,
    /// Upload retries consumed by conflict/limit recovery.
    pub upload_retries: u32,
    /// Zones already announced via `WillUploadZoneChanges`.
    pub notified_upload_zones: HashSet<RecordZoneId>,
    /// Cancels in-flight remote operations.
    pub cancel_token: CancellationToken,
}

impl SyncSession {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            cancelled: false,
            upload_retries: 0,
            notified_upload_zones: HashSet::new(),
            cancel_token: CancellationToken::new(),
        }
    }
}
