//! Remote Database Contract
//!
//! Abstracts the record-oriented backend the sync engine talks to. The
//! backend exposes change-token pagination at two scopes (whole database and
//! per zone), batched writes with optimistic-concurrency conflict reporting,
//! and bare zone management calls.
//!
//! How an operation is physically executed (HTTP, retries, timeouts) is the
//! transport's business; implementations only need to honor the result
//! shapes and the [`RemoteError`](crate::error::RemoteError) taxonomy.
//!
//! # Example
//!
//! ```ignore
//! use sync_traits::remote::{RemoteDatabase, ZoneFetchRequest};
//!
//! async fn poll(db: &dyn RemoteDatabase) -> sync_traits::error::RemoteResult<()> {
//!     let cancel = tokio_util::sync::CancellationToken::new();
//!     let changes = db.fetch_database_changes(None, &cancel).await?;
//!     for zone_id in changes.changed_zone_ids {
//!         // fetch zone changes, apply, ...
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{RemoteError, RemoteResult};
use crate::record::{ChangeToken, RecordId, RecordZoneId, RemoteRecord};

/// Database-level delta: zones that changed or disappeared since a token.
#[derive(Debug, Clone, Default)]
pub struct DatabaseChanges {
    /// Token marking the position this delta brings the client up to.
    pub change_token: Option<ChangeToken>,
    /// Zones with record changes since the requested token.
    pub changed_zone_ids: Vec<RecordZoneId>,
    /// Zones deleted since the requested token.
    pub deleted_zone_ids: Vec<RecordZoneId>,
}

/// One zone's slice of a zone-changes fetch.
#[derive(Debug, Clone)]
pub struct ZoneFetchRequest {
    /// Zone to fetch.
    pub zone_id: RecordZoneId,
    /// Position to fetch from; `None` fetches the zone from the beginning.
    pub since_token: Option<ChangeToken>,
    /// When set, the backend may omit payloads and return only the named
    /// fields. Used for cheap presence checks.
    pub desired_keys: Option<Vec<String>>,
}

/// Result of fetching one zone's changes.
///
/// A zone-scoped failure (for example the zone was deleted mid-fetch) is
/// reported here rather than failing the whole operation, so other zones in
/// the same round still produce results.
#[derive(Debug, Clone, Default)]
pub struct ZoneChanges {
    /// Records created or modified since the requested token.
    pub downloaded_records: Vec<RemoteRecord>,
    /// Ids of records deleted since the requested token.
    pub deleted_record_ids: Vec<RecordId>,
    /// Token marking the position this page brings the client up to.
    pub change_token: Option<ChangeToken>,
    /// True when the backend has more changes for this zone; the caller
    /// should fetch again with the returned token.
    pub more_coming: bool,
    /// Zone-scoped failure, if any.
    pub error: Option<RemoteError>,
}

/// Result of a batched write.
///
/// Mirrors the backend's partial-progress reporting: even a failed batch may
/// have saved some records, and conflicting writes come back with the
/// server's current version of each record.
#[derive(Debug, Clone, Default)]
pub struct ModifyRecordsResult {
    /// Records the backend accepted.
    pub saved_records: Vec<RemoteRecord>,
    /// Ids the backend deleted.
    pub deleted_record_ids: Vec<RecordId>,
    /// Server-side versions of records rejected with a version conflict.
    pub conflicted_records: Vec<RemoteRecord>,
    /// Batch failure, if any. Partial progress above is still valid.
    pub error: Option<RemoteError>,
}

/// Descriptor of a record zone on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordZone {
    /// Identifier of the zone.
    pub zone_id: RecordZoneId,
}

impl RecordZone {
    /// Create a zone descriptor.
    pub fn new(zone_id: RecordZoneId) -> Self {
        Self { zone_id }
    }
}

/// Record-oriented remote backend.
///
/// All long-running operations take a [`CancellationToken`]; implementations
/// should return [`RemoteError::Cancelled`] promptly once it trips, but the
/// engine tolerates an already-started round-trip running to completion.
#[async_trait]
pub trait RemoteDatabase: Send + Sync {
    /// Fetch identifiers of zones changed or deleted since `since_token`.
    ///
    /// The transport owns database-level pagination: the returned delta is
    /// complete up to its token.
    async fn fetch_database_changes(
        &self,
        since_token: Option<&ChangeToken>,
        cancel: &CancellationToken,
    ) -> RemoteResult<DatabaseChanges>;

    /// Fetch record changes for each requested zone.
    ///
    /// Returns one [`ZoneChanges`] per requested zone. Zone-scoped failures
    /// go in [`ZoneChanges::error`]; only an operation-wide failure (network,
    /// cancellation) should fail the whole call.
    async fn fetch_zone_changes(
        &self,
        requests: Vec<ZoneFetchRequest>,
        cancel: &CancellationToken,
    ) -> RemoteResult<HashMap<RecordZoneId, ZoneChanges>>;

    /// Save and delete records in one batch.
    async fn modify_records(
        &self,
        records_to_save: Vec<RemoteRecord>,
        record_ids_to_delete: Vec<RecordId>,
        cancel: &CancellationToken,
    ) -> RemoteResult<ModifyRecordsResult>;

    /// Fetch a zone descriptor, failing with
    /// [`RemoteError::ZoneNotFound`] when it does not exist.
    async fn fetch_zone(&self, zone_id: &RecordZoneId) -> RemoteResult<RecordZone>;

    /// Create or update a zone.
    async fn save_zone(&self, zone: RecordZone) -> RemoteResult<RecordZone>;

    /// Delete a zone and everything in it.
    async fn delete_zone(&self, zone_id: &RecordZoneId) -> RemoteResult<()>;
}
