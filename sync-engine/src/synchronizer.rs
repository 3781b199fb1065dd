//! # Synchronizer
//!
//! Top-level orchestrator of the synchronization state machine. A
//! [`Synchronizer`] owns the adapter registry, the session, and the
//! working set of change tokens, and drives the phases in order:
//!
//! 1. **Fetch**: download remote deltas per zone ([`crate::fetch`])
//! 2. **Merge**: commit them into the local stores and persist zone tokens
//! 3. **Upload**: push local deltas, with conflict and batch-limit
//!    recovery ([`crate::upload`])
//! 4. **Token reconciliation**: confirm no concurrent remote writes before
//!    persisting the database token ([`crate::reconcile`])
//!
//! At most one session is in flight per synchronizer; a second
//! `synchronize` call observes [`SyncError::AlreadySyncing`] immediately.
//! All mutable state lives behind one mutex and is only touched by the task
//! driving the active session, so phases never race.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sync_engine::{Synchronizer, SynchronizerConfig};
//! use sync_runtime::events::EventBus;
//! use std::sync::Arc;
//!
//! let synchronizer = Synchronizer::new(
//!     "main",
//!     SynchronizerConfig::default(),
//!     database,
//!     provider,
//!     key_value_store,
//!     EventBus::default(),
//! );
//! synchronizer.synchronize().await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use sync_runtime::events::{EventBus, SyncEvent};
use sync_traits::{
    AdapterProvider, ChangeToken, KeyValueStore, ModelAdapter, RecordZoneId, RemoteDatabase,
};

use crate::batch::BatchSizeController;
use crate::config::{SyncMode, SynchronizerConfig};
use crate::error::{SyncError, SyncResult};
use crate::session::{SyncPhase, SyncSession};

const DATABASE_TOKEN_KEY: &str = "databaseChangeToken";
const DEVICE_IDENTIFIER_KEY: &str = "deviceIdentifier";

/// How a fetch-upload cycle concluded.
pub(crate) enum CycleOutcome {
    /// Tokens are reconciled; the session is done.
    Completed,
    /// Reconciliation saw remote deltas land during upload; the whole
    /// synchronization must run again before the database token can be
    /// trusted.
    ResyncRequired,
}

/// Synchronizer-owned mutable state, confined behind one mutex.
pub(crate) struct SynchronizerState {
    /// Adapter per known zone.
    pub adapters: HashMap<RecordZoneId, Arc<dyn ModelAdapter>>,
    /// Session-scoped working tokens, distinct from the adapters' durable
    /// tokens. Reset at pass start and in the finish path.
    pub active_zone_tokens: HashMap<RecordZoneId, ChangeToken>,
    /// Adaptive upload page size.
    pub batch_size: BatchSizeController,
    /// The active session, if any.
    pub session: Option<SyncSession>,
    /// Working copy of the database-level token for the current session.
    pub server_change_token: Option<ChangeToken>,
    /// Cached device identifier.
    pub device_identifier: Option<String>,
}

/// Keeps a local, partitioned record store synchronized with a remote
/// record-oriented backend.
pub struct Synchronizer {
    identifier: String,
    pub(crate) config: SynchronizerConfig,
    pub(crate) database: Arc<dyn RemoteDatabase>,
    pub(crate) provider: Arc<dyn AdapterProvider>,
    key_value_store: Arc<dyn KeyValueStore>,
    event_bus: EventBus,
    allow_syncing: AtomicBool,
    pub(crate) state: Mutex<SynchronizerState>,
}

impl Synchronizer {
    /// Create a synchronizer.
    ///
    /// The identifier scopes the synchronizer's persisted state (database
    /// token, device identifier) in the key-value store; reuse the same
    /// identifier across launches or that state is orphaned.
    pub fn new(
        identifier: impl Into<String>,
        config: SynchronizerConfig,
        database: Arc<dyn RemoteDatabase>,
        provider: Arc<dyn AdapterProvider>,
        key_value_store: Arc<dyn KeyValueStore>,
        event_bus: EventBus,
    ) -> Self {
        let batch_size =
            BatchSizeController::new(config.default_batch_size, config.batch_size_step);
        Self {
            identifier: identifier.into(),
            config,
            database,
            provider,
            key_value_store,
            event_bus,
            allow_syncing: AtomicBool::new(true),
            state: Mutex::new(SynchronizerState {
                adapters: HashMap::new(),
                active_zone_tokens: HashMap::new(),
                batch_size,
                session: None,
                server_change_token: None,
                device_identifier: None,
            }),
        }
    }

    /// Identifier this synchronizer persists its state under.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Enable or disable synchronization. While disabled, `synchronize`
    /// fails with [`SyncError::NotAllowed`].
    pub fn set_allow_syncing(&self, allow: bool) {
        self.allow_syncing.store(allow, Ordering::SeqCst);
    }

    /// Whether a session is currently active.
    pub async fn is_syncing(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    /// Phase of the active session, or [`SyncPhase::Idle`].
    pub async fn current_phase(&self) -> SyncPhase {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or(SyncPhase::Idle)
    }

    /// Current upload batch size.
    pub async fn upload_batch_size(&self) -> usize {
        self.state.lock().await.batch_size.current()
    }

    /// Register an adapter so its zone is synchronized.
    pub async fn add_model_adapter(&self, adapter: Arc<dyn ModelAdapter>) {
        let zone_id = adapter.record_zone_id();
        self.state.lock().await.adapters.insert(zone_id, adapter);
    }

    /// Remove an adapter; its zone is no longer synchronized.
    pub async fn remove_model_adapter(&self, zone_id: &RecordZoneId) {
        self.state.lock().await.adapters.remove(zone_id);
    }

    /// Adapters currently managed by this synchronizer.
    pub async fn model_adapters(&self) -> Vec<Arc<dyn ModelAdapter>> {
        self.state.lock().await.adapters.values().cloned().collect()
    }

    /// Synchronize local stores with the remote backend.
    ///
    /// Drives a full fetch → merge → upload → reconcile cycle and resolves
    /// to exactly one terminal outcome, regardless of how many internal
    /// retries or self-healing restarts occur.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotAllowed`] when syncing is disabled
    /// - [`SyncError::AlreadySyncing`] when a session is already active
    /// - [`SyncError::Cancelled`] when `cancel_synchronization` was observed
    /// - any unrecovered remote or local-storage failure
    #[instrument(skip(self), fields(identifier = %self.identifier))]
    pub async fn synchronize(&self) -> SyncResult<()> {
        if !self.allow_syncing.load(Ordering::SeqCst) {
            return Err(SyncError::NotAllowed);
        }
        self.begin_session().await?;

        let result = self.run_to_completion().await;
        self.finish_synchronization(result).await
    }

    /// Request cancellation of the active session.
    ///
    /// Sets the session flag and cancels the in-flight remote operation.
    /// The session does not abort synchronously; the next phase boundary
    /// observes the flag and finishes with [`SyncError::Cancelled`].
    pub async fn cancel_synchronization(&self) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.session.as_mut() {
            if !session.cancelled {
                session.cancelled = true;
                session.cancel_token.cancel();
                info!("synchronization cancellation requested");
            }
        }
    }

    /// Delete the stored database token, so the next synchronization fetches
    /// changes in every zone. Does not touch tokens stored by adapters.
    pub async fn reset_database_token(&self) -> SyncResult<()> {
        self.state.lock().await.server_change_token = None;
        self.key_value_store
            .remove(&self.storage_key(DATABASE_TOKEN_KEY))
            .await?;
        Ok(())
    }

    /// Wipe synchronizer-owned sync state: device identifier, database
    /// token, and the active token map. With `including_adapters`, each
    /// adapter's caches are wiped too.
    pub async fn reset_sync_caches(&self, including_adapters: bool) -> SyncResult<()> {
        self.cancel_synchronization().await;

        {
            let mut state = self.state.lock().await;
            state.device_identifier = None;
            state.server_change_token = None;
            state.active_zone_tokens.clear();
        }
        self.key_value_store
            .remove(&self.storage_key(DEVICE_IDENTIFIER_KEY))
            .await?;
        self.key_value_store
            .remove(&self.storage_key(DATABASE_TOKEN_KEY))
            .await?;

        if including_adapters {
            for adapter in self.model_adapters().await {
                adapter.reset_sync_caches().await?;
            }
        }
        Ok(())
    }

    /// Delete the adapter's zone on the backend, along with any data in it,
    /// and clear the adapter's durable token.
    pub async fn delete_record_zone(&self, adapter: &Arc<dyn ModelAdapter>) -> SyncResult<()> {
        let zone_id = adapter.record_zone_id();
        let result = self.database.delete_zone(&zone_id).await;
        adapter.save_token(None).await?;
        match result {
            Ok(()) => {
                debug!(zone = %zone_id, "deleted record zone");
                Ok(())
            }
            Err(e) => {
                error!(zone = %zone_id, error = %e, "failed to delete record zone");
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    async fn begin_session(&self) -> SyncResult<()> {
        let mut state = self.state.lock().await;
        if state.session.is_some() {
            return Err(SyncError::AlreadySyncing);
        }
        state.session = Some(SyncSession::new());
        Ok(())
    }

    /// Run synchronization passes until a terminal outcome, self-healing
    /// expired database tokens with a full resync.
    async fn run_to_completion(&self) -> SyncResult<()> {
        loop {
            match self.perform_synchronization().await {
                Err(SyncError::Remote(e)) if e.is_token_expired() => {
                    warn!("database change token expired, restarting with a full fetch");
                    self.handle_expired_token().await?;
                }
                other => return other,
            }
        }
    }

    /// One synchronization pass: fetch-upload cycles until reconciliation
    /// confirms the backend is quiet.
    async fn perform_synchronization(&self) -> SyncResult<()> {
        loop {
            self.prepare_pass().await?;
            match self.run_cycle().await? {
                CycleOutcome::Completed => return Ok(()),
                CycleOutcome::ResyncRequired => {
                    debug!("remote deltas detected during reconciliation, resynchronizing");
                }
            }
        }
    }

    /// Reset per-pass state and bracket every known adapter with
    /// `prepare_to_import`.
    async fn prepare_pass(&self) -> SyncResult<()> {
        self.emit(SyncEvent::WillSynchronize);

        let stored = self.load_database_token().await?;
        let adapters = {
            let mut state = self.state.lock().await;
            state.server_change_token = stored;
            state.active_zone_tokens.clear();
            if let Some(session) = state.session.as_mut() {
                session.upload_retries = 0;
                session.notified_upload_zones.clear();
            }
            state.adapters.values().cloned().collect::<Vec<_>>()
        };
        for adapter in adapters {
            adapter.prepare_to_import().await;
        }
        Ok(())
    }

    async fn run_cycle(&self) -> SyncResult<CycleOutcome> {
        loop {
            self.check_cancelled().await?;
            self.set_phase(SyncPhase::Fetching).await;
            self.emit(SyncEvent::WillFetchChanges);
            self.fetch_changes().await?;

            if self.config.sync_mode == SyncMode::DownloadOnly {
                return Ok(CycleOutcome::Completed);
            }

            self.check_cancelled().await?;
            self.set_phase(SyncPhase::Uploading).await;
            self.emit(SyncEvent::WillUploadChanges);
            match self.upload_changes().await {
                Ok(()) => {
                    self.state.lock().await.batch_size.record_success();
                    self.set_phase(SyncPhase::TokenReconciling).await;
                    return self.reconcile_tokens().await;
                }
                Err(error) => {
                    if self.register_upload_retry(&error).await {
                        debug!(error = %error, "retrying upload after recoverable failure");
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Terminal step for every path: release per-import resources, clear the
    /// session, and report the single outcome.
    async fn finish_synchronization(&self, result: SyncResult<()>) -> SyncResult<()> {
        let result = result.map_err(SyncError::normalized);

        let adapters = {
            let mut state = self.state.lock().await;
            state.active_zone_tokens.clear();
            if let Some(session) = state.session.as_mut() {
                session.upload_retries = 0;
                session.phase = match &result {
                    Ok(()) => SyncPhase::Idle,
                    Err(SyncError::Cancelled) => SyncPhase::Cancelled,
                    Err(_) => SyncPhase::Failed,
                };
            }
            state.adapters.values().cloned().collect::<Vec<_>>()
        };

        let error_message = result.as_ref().err().map(|e| e.to_string());
        for adapter in adapters {
            adapter.did_finish_import(error_message.as_deref()).await;
        }

        self.state.lock().await.session = None;

        match &result {
            Ok(()) => {
                info!("synchronization finished");
                self.emit(SyncEvent::DidSynchronize);
            }
            Err(e) => {
                error!(error = %e, "synchronization failed");
                self.emit(SyncEvent::DidFailToSynchronize {
                    message: e.to_string(),
                });
            }
        }

        result
    }

    /// Self-healing for an expired database token: drop all change tracking
    /// and adapters, clear the stored token, and let the caller refetch from
    /// scratch. Re-discovered zones get fresh adapters from the provider.
    async fn handle_expired_token(&self) -> SyncResult<()> {
        self.reset_database_token().await?;
        let adapters = {
            let mut state = self.state.lock().await;
            state.active_zone_tokens.clear();
            state.adapters.drain().map(|(_, a)| a).collect::<Vec<_>>()
        };
        for adapter in adapters {
            adapter.delete_change_tracking().await?;
        }
        Ok(())
    }

    async fn register_upload_retry(&self, error: &SyncError) -> bool {
        if !error.is_retryable_upload_error() {
            return false;
        }
        let mut state = self.state.lock().await;
        match state.session.as_mut() {
            Some(session) if session.upload_retries < self.config.max_upload_retries => {
                session.upload_retries += 1;
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    pub(crate) fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(event).ok();
    }

    pub(crate) async fn set_phase(&self, phase: SyncPhase) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.session.as_mut() {
            session.phase = phase;
        }
    }

    /// Fail with `Cancelled` once the session's flag has been set. Phase
    /// boundaries call this; an in-flight operation is never preempted.
    pub(crate) async fn check_cancelled(&self) -> SyncResult<()> {
        let state = self.state.lock().await;
        match state.session.as_ref() {
            Some(session) if session.cancelled => Err(SyncError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Cancellation token of the active session, threaded through remote
    /// operations.
    pub(crate) async fn cancel_token(&self) -> CancellationToken {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.cancel_token.clone())
            .unwrap_or_else(CancellationToken::new)
    }

    /// Registered adapters in deterministic zone order, for sequential
    /// per-zone processing.
    pub(crate) async fn adapters_in_order(&self) -> Vec<Arc<dyn ModelAdapter>> {
        let state = self.state.lock().await;
        let mut entries: Vec<_> = state
            .adapters
            .iter()
            .map(|(zone, adapter)| (zone.to_string(), Arc::clone(adapter)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, adapter)| adapter).collect()
    }

    /// Identifier of this device, created and persisted on first use.
    pub(crate) async fn device_identifier(&self) -> SyncResult<String> {
        if let Some(id) = self.state.lock().await.device_identifier.clone() {
            return Ok(id);
        }

        let key = self.storage_key(DEVICE_IDENTIFIER_KEY);
        if let Some(stored) = self.key_value_store.get_string(&key).await? {
            self.state.lock().await.device_identifier = Some(stored.clone());
            return Ok(stored);
        }

        let fresh = Uuid::new_v4().to_string();
        self.key_value_store.set_string(&key, &fresh).await?;
        debug!(device = %fresh, "created device identifier");
        self.state.lock().await.device_identifier = Some(fresh.clone());
        Ok(fresh)
    }

    pub(crate) async fn load_database_token(&self) -> SyncResult<Option<ChangeToken>> {
        let stored = self
            .key_value_store
            .get_string(&self.storage_key(DATABASE_TOKEN_KEY))
            .await?;
        Ok(stored.map(ChangeToken::from))
    }

    /// Persist the database-level token; the zones it covers are caught up.
    pub(crate) async fn persist_database_token(
        &self,
        token: Option<&ChangeToken>,
    ) -> SyncResult<()> {
        let key = self.storage_key(DATABASE_TOKEN_KEY);
        match token {
            Some(token) => {
                self.key_value_store
                    .set_string(&key, token.as_str())
                    .await?
            }
            None => self.key_value_store.remove(&key).await?,
        }
        Ok(())
    }

    fn storage_key(&self, suffix: &str) -> String {
        format!("{}.{}", self.identifier, suffix)
    }
}
