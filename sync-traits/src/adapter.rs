//! Model Adapter Contract
//!
//! A [`ModelAdapter`] is the sync engine's view of one zone's local store:
//! it produces dirty records for upload, consumes downloaded records and
//! deletions, and durably persists that zone's change token. The engine never
//! inspects adapter-internal storage.
//!
//! Adapters are invoked sequentially from the engine's single logical
//! context and may use their own internal synchronization.

use async_trait::async_trait;
use std::sync::Arc;

use crate::record::{ChangeToken, RecordId, RecordZoneId, RemoteRecord};

/// Errors surfaced by a model adapter's local storage.
///
/// The engine does not interpret these beyond reporting them; the payload is
/// whatever the adapter's storage produced.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Local storage error: {0}")]
pub struct AdapterError(pub String);

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Per-zone local store contract consumed by the sync engine.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Zone this adapter manages.
    fn record_zone_id(&self) -> RecordZoneId;

    /// Durable change token for this zone. `None` means the zone has never
    /// completed a sync.
    async fn server_change_token(&self) -> Option<ChangeToken>;

    /// Persist the zone's change token. `None` clears it.
    async fn save_token(&self, token: Option<ChangeToken>) -> AdapterResult<()>;

    /// Apply a coalesced batch of downloaded records.
    ///
    /// `force_save` overrides local conflict markers; the engine sets it when
    /// merging server-side versions of conflicting records.
    async fn save_changes(&self, records: Vec<RemoteRecord>, force_save: bool)
        -> AdapterResult<()>;

    /// Apply a coalesced batch of deletions.
    async fn delete_records(&self, ids: Vec<RecordId>) -> AdapterResult<()>;

    /// Commit the changes applied since `prepare_to_import`. Invoked once per
    /// zone per merge step.
    async fn persist_imported_changes(&self) -> AdapterResult<()>;

    /// Up to `limit` locally modified records awaiting upload.
    async fn records_to_upload(&self, limit: usize) -> AdapterResult<Vec<RemoteRecord>>;

    /// Up to `limit` ids of locally deleted records awaiting remote deletion.
    async fn record_ids_marked_for_deletion(&self, limit: usize) -> AdapterResult<Vec<RecordId>>;

    /// Acknowledge records the backend accepted, with the server-issued
    /// versions (change tags) to track.
    async fn did_upload(&self, saved_records: Vec<RemoteRecord>) -> AdapterResult<()>;

    /// Acknowledge deletions the backend accepted.
    async fn did_delete(&self, ids: Vec<RecordId>) -> AdapterResult<()>;

    /// Drop change tracking for specific records. Used when the backend
    /// reports them missing, so stale tombstones and dirty markers don't
    /// wedge future uploads.
    async fn delete_change_tracking_for(&self, ids: Vec<RecordId>) -> AdapterResult<()>;

    /// Drop all change tracking for this zone.
    async fn delete_change_tracking(&self) -> AdapterResult<()>;

    /// Import-session bracket: called before the engine starts feeding
    /// changes for a sync session.
    async fn prepare_to_import(&self);

    /// Import-session bracket: always called when the session ends, with the
    /// session's failure if any, so per-import resources can be released.
    async fn did_finish_import(&self, error: Option<&str>);

    /// Wipe the zone's sync caches: token and all change tracking.
    async fn reset_sync_caches(&self) -> AdapterResult<()>;
}

/// Supplies model adapters for zones the engine discovers at runtime.
#[async_trait]
pub trait AdapterProvider: Send + Sync {
    /// Return an adapter for a zone the backend reported changes in, or
    /// `None` to ignore that zone.
    async fn model_adapter_for_zone(&self, zone_id: &RecordZoneId)
        -> Option<Arc<dyn ModelAdapter>>;

    /// The backend reported the zone deleted; clean up anything associated
    /// with it.
    async fn zone_was_deleted(&self, zone_id: &RecordZoneId);
}
