//! Upload phase.
//!
//! Pushes local deltas zone by zone: zone setup for never-synced adapters,
//! then paginated record uploads, then paginated deletion uploads. Batch
//! sizing is adaptive, conflicts are force-merged back into the local store,
//! and all per-zone work runs through the sequential task runner so only one
//! zone writes at a time.

use std::sync::Arc;

use tracing::{debug, warn};

use sync_runtime::events::SyncEvent;
use sync_traits::{ModelAdapter, RecordZone, RecordZoneId, RemoteError, RemoteRecord};

use crate::error::SyncResult;
use crate::sequence::run_sequential;
use crate::synchronizer::Synchronizer;

impl Synchronizer {
    /// Push dirty records and tombstones for every registered adapter, in
    /// zone order, one zone at a time.
    pub(crate) async fn upload_changes(&self) -> SyncResult<()> {
        let cancel = self.cancel_token().await;
        let pause = self.config.step_pause;
        let adapters = self.adapters_in_order().await;

        run_sequential(adapters.clone(), &cancel, pause, |adapter| async move {
            self.setup_zone_and_upload_records(adapter).await
        })
        .await?;

        run_sequential(adapters, &cancel, pause, |adapter| async move {
            self.upload_deletions(adapter).await
        })
        .await?;

        Ok(())
    }

    async fn setup_zone_and_upload_records(
        &self,
        adapter: Arc<dyn ModelAdapter>,
    ) -> SyncResult<()> {
        // An adapter without a durable token has never completed a sync;
        // its remote zone may not exist yet.
        if adapter.server_change_token().await.is_none() {
            self.setup_record_zone(adapter.record_zone_id()).await?;
        }
        self.upload_records(adapter).await
    }

    async fn setup_record_zone(&self, zone_id: RecordZoneId) -> SyncResult<()> {
        match self.database.fetch_zone(&zone_id).await {
            Ok(_) => Ok(()),
            Err(error) if error.is_zone_not_found_or_deleted() => {
                let zone = self.database.save_zone(RecordZone::new(zone_id)).await?;
                debug!(zone = %zone.zone_id, "created record zone");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Upload one zone's dirty records in adaptive-size pages.
    async fn upload_records(&self, adapter: Arc<dyn ModelAdapter>) -> SyncResult<()> {
        let cancel = self.cancel_token().await;
        let zone_id = adapter.record_zone_id();

        loop {
            let requested_batch_size = self.upload_batch_size().await;
            let records = adapter.records_to_upload(requested_batch_size).await?;
            let record_count = records.len();
            if record_count == 0 {
                return Ok(());
            }

            self.notify_zone_upload(&zone_id).await;

            let records = self.stamp_metadata(records).await?;
            let result = self
                .database
                .modify_records(records, Vec::new(), &cancel)
                .await?;

            if !result.saved_records.is_empty() {
                debug!(
                    zone = %zone_id,
                    records = result.saved_records.len(),
                    "uploaded records"
                );
            }
            adapter.did_upload(result.saved_records).await?;

            if let Some(error) = result.error {
                if error.is_limit_exceeded() {
                    self.state.lock().await.batch_size.record_limit_exceeded();
                    return Err(error.into());
                }

                // Partial failures resolve missing-record tracking before
                // conflicts, so a record that is both missing and conflicted
                // is dropped from tracking rather than force-merged.
                let missing =
                    error.item_ids_where(|e| matches!(e, RemoteError::RecordNotFound));
                if !missing.is_empty() {
                    warn!(
                        zone = %zone_id,
                        records = missing.len(),
                        "dropping change tracking for records missing remotely"
                    );
                    adapter.delete_change_tracking_for(missing).await?;
                }

                if !result.conflicted_records.is_empty() {
                    // The server versions win locally; the caller decides
                    // whether to retry the sync after the merge.
                    adapter
                        .save_changes(result.conflicted_records, true)
                        .await?;
                    if let Err(persist_error) = adapter.persist_imported_changes().await {
                        warn!(
                            zone = %zone_id,
                            error = %persist_error,
                            "failed to persist force-merged conflicts"
                        );
                    }
                }

                return Err(error.into());
            }

            // A short page means the dirty set is drained.
            if record_count < requested_batch_size {
                return Ok(());
            }
        }
    }

    /// Upload one zone's deletions in adaptive-size pages. Deletions are not
    /// versioned, so no conflict branch applies.
    async fn upload_deletions(&self, adapter: Arc<dyn ModelAdapter>) -> SyncResult<()> {
        let cancel = self.cancel_token().await;
        let zone_id = adapter.record_zone_id();

        loop {
            let requested_batch_size = self.upload_batch_size().await;
            let ids = adapter
                .record_ids_marked_for_deletion(requested_batch_size)
                .await?;
            let id_count = ids.len();
            if id_count == 0 {
                return Ok(());
            }

            let result = self.database.modify_records(Vec::new(), ids, &cancel).await?;

            if !result.deleted_record_ids.is_empty() {
                debug!(
                    zone = %zone_id,
                    deletions = result.deleted_record_ids.len(),
                    "deleted records remotely"
                );
            }
            adapter.did_delete(result.deleted_record_ids).await?;

            if let Some(error) = result.error {
                if error.is_limit_exceeded() {
                    self.state.lock().await.batch_size.record_limit_exceeded();
                }
                return Err(error.into());
            }

            if id_count < requested_batch_size {
                return Ok(());
            }
        }
    }

    /// Stamp origin metadata on outgoing records.
    async fn stamp_metadata(
        &self,
        mut records: Vec<RemoteRecord>,
    ) -> SyncResult<Vec<RemoteRecord>> {
        let device_identifier = self.device_identifier().await?;
        for record in &mut records {
            record.metadata.device_identifier = Some(device_identifier.clone());
            record.metadata.model_version = self.config.compatibility_version;
        }
        Ok(records)
    }

    /// Announce the first upload for a zone, once per session.
    async fn notify_zone_upload(&self, zone_id: &RecordZoneId) {
        let first_time = {
            let mut state = self.state.lock().await;
            match state.session.as_mut() {
                Some(session) => session.notified_upload_zones.insert(zone_id.clone()),
                None => false,
            }
        };
        if first_time {
            self.emit(SyncEvent::WillUploadZoneChanges {
                zone_id: zone_id.to_string(),
            });
        }
    }
}
