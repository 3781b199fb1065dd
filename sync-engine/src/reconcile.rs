//! Token reconciliation phase.
//!
//! After a successful upload pass the engine refuses to trust its post-upload
//! snapshot: a concurrent remote writer may have landed changes between the
//! fetch and the upload. One more database-scope fetch decides the outcome:
//! any zone reporting fresh deltas sends the whole synchronization back to
//! the start, and only a quiet backend gets its tokens persisted as caught
//! up.

use tracing::debug;

use sync_traits::ZoneFetchRequest;

use crate::error::SyncResult;
use crate::synchronizer::{CycleOutcome, Synchronizer};

/// Fields requested for the reconciliation presence check; payloads are not
/// needed to decide whether a zone changed.
const RECONCILE_KEYS: &[&str] = &["record_id", "device_identifier"];

impl Synchronizer {
    /// Confirm no remote writes landed during upload, then persist the
    /// database token. Returns [`CycleOutcome::ResyncRequired`] when the
    /// backend reports new deltas instead.
    pub(crate) async fn reconcile_tokens(&self) -> SyncResult<CycleOutcome> {
        let cancel = self.cancel_token().await;
        let since = self.state.lock().await.server_change_token.clone();

        let changes = self
            .database
            .fetch_database_changes(since.as_ref(), &cancel)
            .await?;

        self.handle_deleted_zones(&changes.deleted_zone_ids).await;

        if changes.changed_zone_ids.is_empty() {
            self.persist_database_token(changes.change_token.as_ref())
                .await?;
            return Ok(CycleOutcome::Completed);
        }

        let zones = self
            .load_active_tokens(&changes.changed_zone_ids, false)
            .await;

        // A reporting zone without a token is a zone this session never
        // fully fetched; the post-upload snapshot cannot be trusted.
        let has_all_tokens = {
            let state = self.state.lock().await;
            zones
                .iter()
                .all(|zone| state.active_zone_tokens.contains_key(zone))
        };
        if !has_all_tokens {
            return Ok(CycleOutcome::ResyncRequired);
        }

        let device_identifier = self.device_identifier().await?;

        let mut pending = zones;
        while !pending.is_empty() {
            let requests = {
                let state = self.state.lock().await;
                pending
                    .iter()
                    .map(|zone_id| ZoneFetchRequest {
                        zone_id: zone_id.clone(),
                        since_token: state.active_zone_tokens.get(zone_id).cloned(),
                        desired_keys: Some(
                            RECONCILE_KEYS.iter().map(|k| k.to_string()).collect(),
                        ),
                    })
                    .collect::<Vec<_>>()
            };

            let mut results = self.database.fetch_zone_changes(requests, &cancel).await?;

            let mut next = Vec::new();
            for zone_id in pending {
                let Some(result) = results.remove(&zone_id) else {
                    continue;
                };

                if let Some(error) = result.error {
                    if error.is_zone_not_found_or_deleted() {
                        self.handle_deleted_zones(std::slice::from_ref(&zone_id))
                            .await;
                        continue;
                    }
                    return Err(error.into());
                }

                // The probe runs from a pre-upload token, so this device's
                // own freshly uploaded records come back as changes; only
                // foreign writes mean someone else got in.
                let foreign_writes = result.downloaded_records.iter().any(|record| {
                    record.metadata.device_identifier.as_deref() != Some(device_identifier.as_str())
                });
                if foreign_writes || !result.deleted_record_ids.is_empty() {
                    debug!(zone = %zone_id, "remote deltas landed during upload");
                    return Ok(CycleOutcome::ResyncRequired);
                }

                if let Some(token) = result.change_token {
                    let adapter = {
                        let mut state = self.state.lock().await;
                        state
                            .active_zone_tokens
                            .insert(zone_id.clone(), token.clone());
                        state.adapters.get(&zone_id).cloned()
                    };
                    if let Some(adapter) = adapter {
                        adapter.save_token(Some(token)).await?;
                    }
                }

                if result.more_coming {
                    next.push(zone_id);
                }
            }
            pending = next;
        }

        self.persist_database_token(changes.change_token.as_ref())
            .await?;
        Ok(CycleOutcome::Completed)
    }
}
