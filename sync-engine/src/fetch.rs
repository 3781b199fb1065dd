//! Change fetch phase.
//!
//! Two-level pagination: one database-scope fetch discovers which zones
//! changed or disappeared, then zone-scope rounds pull record changes for
//! every affected zone until none reports `more_coming`. Individual records
//! flow through the [`ChangeCoalescer`] instead of being applied one by one,
//! and the merge step afterwards commits each zone's import and persists its
//! token durably.

use std::sync::Arc;

use tracing::{debug, info};

use sync_runtime::events::SyncEvent;
use sync_traits::{ChangeToken, ModelAdapter, RecordZoneId, ZoneFetchRequest};

use crate::coalesce::ChangeCoalescer;
use crate::error::{SyncError, SyncResult};
use crate::sequence::run_sequential;
use crate::session::SyncPhase;
use crate::synchronizer::Synchronizer;

impl Synchronizer {
    /// Fetch remote deltas, feed them through the coalescer, and merge them
    /// into the local stores. On success the session's database token has
    /// been advanced and persisted.
    pub(crate) async fn fetch_changes(&self) -> SyncResult<()> {
        let cancel = self.cancel_token().await;
        let since = self.state.lock().await.server_change_token.clone();

        let changes = self
            .database
            .fetch_database_changes(since.as_ref(), &cancel)
            .await?;

        self.handle_deleted_zones(&changes.deleted_zone_ids).await;

        let zones_to_fetch = self
            .load_active_tokens(&changes.changed_zone_ids, true)
            .await;

        if !zones_to_fetch.is_empty() {
            for zone_id in &zones_to_fetch {
                self.emit(SyncEvent::WillFetchZoneChanges {
                    zone_id: zone_id.to_string(),
                });
            }

            let coalescer = ChangeCoalescer::new(self.config.debounce_window);
            if let Err(error) = self.fetch_zone_rounds(zones_to_fetch, &coalescer).await {
                coalescer.discard().await;
                return Err(error);
            }

            // No buffered entry may outlive the fetch phase, and flush
            // failures must surface before any token is treated as final.
            let flush_errors = coalescer.finish_processing().await;
            if let Some(error) = flush_errors.into_iter().next() {
                return Err(error.into());
            }

            self.merge_changes().await?;
        }

        let token = changes.change_token;
        self.persist_database_token(token.as_ref()).await?;
        self.state.lock().await.server_change_token = token;
        Ok(())
    }

    /// Zone-scope fetch rounds. A zone reporting `more_coming` is requeued;
    /// rounds repeat until every zone is drained or a zone fails with
    /// something other than a deletion.
    async fn fetch_zone_rounds(
        &self,
        mut zones: Vec<RecordZoneId>,
        coalescer: &ChangeCoalescer,
    ) -> SyncResult<()> {
        let cancel = self.cancel_token().await;
        let device_identifier = self.device_identifier().await?;

        while !zones.is_empty() {
            let requests = {
                let state = self.state.lock().await;
                zones
                    .iter()
                    .map(|zone_id| ZoneFetchRequest {
                        zone_id: zone_id.clone(),
                        since_token: state.active_zone_tokens.get(zone_id).cloned(),
                        desired_keys: None,
                    })
                    .collect::<Vec<_>>()
            };

            let mut results = self.database.fetch_zone_changes(requests, &cancel).await?;

            let mut pending = Vec::new();
            for zone_id in zones {
                let Some(result) = results.remove(&zone_id) else {
                    continue;
                };

                if let Some(error) = result.error {
                    if error.is_zone_not_found_or_deleted() {
                        // A deletion mid-fetch is a removal side effect, not
                        // a failure; the round continues for other zones.
                        self.handle_deleted_zones(std::slice::from_ref(&zone_id))
                            .await;
                        continue;
                    }
                    return Err(error.into());
                }

                let adapter = {
                    let state = self.state.lock().await;
                    state.adapters.get(&zone_id).cloned()
                };
                let Some(adapter) = adapter else {
                    continue;
                };

                if !result.downloaded_records.is_empty() {
                    debug!(
                        zone = %zone_id,
                        records = result.downloaded_records.len(),
                        "downloaded changed records"
                    );
                }
                if !result.deleted_record_ids.is_empty() {
                    debug!(
                        zone = %zone_id,
                        deletions = result.deleted_record_ids.len(),
                        "downloaded deleted record ids"
                    );
                }

                for record in result.downloaded_records {
                    // Skip this device's own writes.
                    if record.metadata.device_identifier.as_deref()
                        == Some(device_identifier.as_str())
                    {
                        continue;
                    }
                    if self.config.compatibility_version > 0
                        && record.metadata.model_version > self.config.compatibility_version
                    {
                        return Err(SyncError::HigherModelVersionFound);
                    }
                    coalescer.push_saved(Arc::clone(&adapter), record).await;
                }
                for id in result.deleted_record_ids {
                    coalescer.push_deleted(Arc::clone(&adapter), id).await;
                }

                if let Some(token) = result.change_token {
                    self.state
                        .lock()
                        .await
                        .active_zone_tokens
                        .insert(zone_id.clone(), token);
                }

                if result.more_coming {
                    pending.push(zone_id);
                }
            }
            zones = pending;
        }

        Ok(())
    }

    /// Commit each active zone's import sequentially and persist its token.
    /// The durable token only advances after the adapter confirms the merge.
    async fn merge_changes(&self) -> SyncResult<()> {
        self.check_cancelled().await?;
        self.set_phase(SyncPhase::Merging).await;

        let targets: Vec<(Arc<dyn ModelAdapter>, Option<ChangeToken>)> = {
            let state = self.state.lock().await;
            let mut zones: Vec<_> = state.active_zone_tokens.keys().cloned().collect();
            zones.sort_by_key(|zone| zone.to_string());
            zones
                .into_iter()
                .filter_map(|zone_id| {
                    state.adapters.get(&zone_id).map(|adapter| {
                        (
                            Arc::clone(adapter),
                            state.active_zone_tokens.get(&zone_id).cloned(),
                        )
                    })
                })
                .collect()
        };

        let cancel = self.cancel_token().await;
        run_sequential(
            targets,
            &cancel,
            self.config.step_pause,
            |(adapter, token)| async move {
                adapter.persist_imported_changes().await?;
                if let Some(token) = token {
                    adapter.save_token(Some(token)).await?;
                }
                Ok::<(), SyncError>(())
            },
        )
        .await?;

        Ok(())
    }

    /// Load working tokens for the given zones, lazily creating adapters
    /// through the provider when `load_adapters` is set. Returns the zones
    /// that have an adapter; the rest are ignored.
    pub(crate) async fn load_active_tokens(
        &self,
        zone_ids: &[RecordZoneId],
        load_adapters: bool,
    ) -> Vec<RecordZoneId> {
        self.state.lock().await.active_zone_tokens.clear();

        let mut filtered = Vec::new();
        for zone_id in zone_ids {
            let existing = self.state.lock().await.adapters.get(zone_id).cloned();
            let adapter = match existing {
                Some(adapter) => Some(adapter),
                None if load_adapters => {
                    match self.provider.model_adapter_for_zone(zone_id).await {
                        Some(new_adapter) => {
                            self.state
                                .lock()
                                .await
                                .adapters
                                .insert(zone_id.clone(), Arc::clone(&new_adapter));
                            self.emit(SyncEvent::AdapterAdded {
                                zone_id: zone_id.to_string(),
                            });
                            info!(zone = %zone_id, "adapter added for new zone");
                            new_adapter.prepare_to_import().await;
                            Some(new_adapter)
                        }
                        None => None,
                    }
                }
                None => None,
            };

            if let Some(adapter) = adapter {
                filtered.push(zone_id.clone());
                if let Some(token) = adapter.server_change_token().await {
                    self.state
                        .lock()
                        .await
                        .active_zone_tokens
                        .insert(zone_id.clone(), token);
                }
            }
        }
        filtered
    }

    /// The backend reported these zones gone: drop their adapters, tell the
    /// provider, and announce the deletions.
    pub(crate) async fn handle_deleted_zones(&self, zone_ids: &[RecordZoneId]) {
        for zone_id in zone_ids {
            {
                let mut state = self.state.lock().await;
                state.adapters.remove(zone_id);
                state.active_zone_tokens.remove(zone_id);
            }
            self.provider.zone_was_deleted(zone_id).await;
            self.emit(SyncEvent::ZoneDeleted {
                zone_id: zone_id.to_string(),
            });
            info!(zone = %zone_id, "zone deleted remotely");
        }
    }
}
