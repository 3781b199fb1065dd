//! Debounced coalescing of streamed remote changes.
//!
//! Zone change feeds hand the engine records one at a time; applying each
//! individually write-amplifies the local store. The coalescer buffers
//! incoming entries and applies them per adapter as one `save_changes` plus
//! one `delete_records` call, flushing when the debounce window has elapsed
//! since the previous flush and otherwise scheduling a deferred flush at
//! `last_flush + window`.
//!
//! Flush failures are recorded rather than thrown so a late adapter error
//! cannot corrupt bookkeeping already advanced for other zones; the fetch
//! phase drains the recorded errors from [`ChangeCoalescer::finish_processing`]
//! before its tokens are considered final.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use sync_traits::{AdapterError, ModelAdapter, RecordId, RecordZoneId, RemoteRecord};

enum PendingChange {
    Save {
        adapter: Arc<dyn ModelAdapter>,
        record: RemoteRecord,
    },
    Delete {
        adapter: Arc<dyn ModelAdapter>,
        id: RecordId,
    },
}

impl PendingChange {
    fn zone_id(&self) -> RecordZoneId {
        match self {
            PendingChange::Save { adapter, .. } | PendingChange::Delete { adapter, .. } => {
                adapter.record_zone_id()
            }
        }
    }

    fn adapter(&self) -> &Arc<dyn ModelAdapter> {
        match self {
            PendingChange::Save { adapter, .. } | PendingChange::Delete { adapter, .. } => adapter,
        }
    }
}

struct CoalescerState {
    pending: Vec<PendingChange>,
    last_flush: Instant,
    scheduled: Option<JoinHandle<()>>,
    flush_errors: Vec<AdapterError>,
}

struct CoalescerInner {
    window: Duration,
    state: Mutex<CoalescerState>,
}

/// Debounced buffer between a zone change feed and the model adapters.
///
/// Holds no reference to the synchronizer; entries carry their owning
/// adapter and errors flow back out through `finish_processing`.
pub struct ChangeCoalescer {
    inner: Arc<CoalescerInner>,
}

impl ChangeCoalescer {
    /// Create a coalescer with the given debounce window. The window starts
    /// counting from creation.
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(CoalescerInner {
                window,
                state: Mutex::new(CoalescerState {
                    pending: Vec::new(),
                    last_flush: Instant::now(),
                    scheduled: None,
                    flush_errors: Vec::new(),
                }),
            }),
        }
    }

    /// Buffer a downloaded record for `adapter`.
    pub async fn push_saved(&self, adapter: Arc<dyn ModelAdapter>, record: RemoteRecord) {
        self.push(PendingChange::Save { adapter, record }).await;
    }

    /// Buffer a deleted record id for `adapter`.
    pub async fn push_deleted(&self, adapter: Arc<dyn ModelAdapter>, id: RecordId) {
        self.push(PendingChange::Delete { adapter, id }).await;
    }

    async fn push(&self, change: PendingChange) {
        let mut state = self.inner.state.lock().await;
        state.pending.push(change);

        if state.last_flush.elapsed() >= self.inner.window {
            if let Some(handle) = state.scheduled.take() {
                handle.abort();
            }
            CoalescerInner::flush(&mut state).await;
        } else {
            // Reschedule the deferred flush at last_flush + window. The old
            // task is aborted under the lock, so it can never be mid-flush.
            if let Some(handle) = state.scheduled.take() {
                handle.abort();
            }
            let deadline = state.last_flush + self.inner.window;
            let inner = Arc::clone(&self.inner);
            state.scheduled = Some(tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                let mut state = inner.state.lock().await;
                state.scheduled = None;
                CoalescerInner::flush(&mut state).await;
            }));
        }
    }

    /// Cancel any pending deferred flush, flush whatever is buffered, and
    /// drain the errors recorded by every flush so far.
    ///
    /// Called once fetch pagination is exhausted; afterwards no buffered
    /// entry remains.
    pub async fn finish_processing(&self) -> Vec<AdapterError> {
        let mut state = self.inner.state.lock().await;
        if let Some(handle) = state.scheduled.take() {
            handle.abort();
        }
        CoalescerInner::flush(&mut state).await;
        std::mem::take(&mut state.flush_errors)
    }

    /// Drop buffered entries and any scheduled flush without applying them.
    /// Used when the fetch phase aborts; a flush firing after the abort
    /// would apply records outside any import bracket.
    pub async fn discard(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(handle) = state.scheduled.take() {
            handle.abort();
        }
        state.pending.clear();
        state.flush_errors.clear();
    }
}

impl CoalescerInner {
    async fn flush(state: &mut CoalescerState) {
        state.last_flush = Instant::now();
        if state.pending.is_empty() {
            return;
        }

        let pending = std::mem::take(&mut state.pending);
        debug!(entries = pending.len(), "flushing coalesced changes");

        // One save + one delete call per adapter, with the full snapshot.
        let mut by_zone: HashMap<
            RecordZoneId,
            (Arc<dyn ModelAdapter>, Vec<RemoteRecord>, Vec<RecordId>),
        > = HashMap::new();

        for change in pending {
            let entry = by_zone
                .entry(change.zone_id())
                .or_insert_with(|| (Arc::clone(change.adapter()), Vec::new(), Vec::new()));
            match change {
                PendingChange::Save { record, .. } => entry.1.push(record),
                PendingChange::Delete { id, .. } => entry.2.push(id),
            }
        }

        for (zone_id, (adapter, records, deleted_ids)) in by_zone {
            if !records.is_empty() {
                if let Err(error) = adapter.save_changes(records, false).await {
                    warn!(zone = %zone_id, %error, "failed to apply downloaded records");
                    state.flush_errors.push(error);
                }
            }
            if !deleted_ids.is_empty() {
                if let Err(error) = adapter.delete_records(deleted_ids).await {
                    warn!(zone = %zone_id, %error, "failed to apply deletions");
                    state.flush_errors.push(error);
                }
            }
        }
    }
}
