//! Synchronizer configuration.

use std::time::Duration;

/// Whether a synchronizer uploads local changes or only downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Download and upload all changes.
    Sync,
    /// Only download changes.
    DownloadOnly,
}

/// Synchronizer configuration.
///
/// All tuning knobs are passed at construction; the engine holds no global
/// state.
#[derive(Debug, Clone)]
pub struct SynchronizerConfig {
    /// Upload batch-size ceiling, and the size a fresh synchronizer starts
    /// at. The backend's suggested maximum is 400 records per batch.
    pub default_batch_size: usize,

    /// Additive step the batch size recovers by after a fully successful
    /// upload pass.
    pub batch_size_step: usize,

    /// How many times a conflict or batch-limit failure may retry the
    /// fetch-and-upload cycle within one session.
    pub max_upload_retries: u32,

    /// Debounce window of the change coalescer: buffered remote changes are
    /// flushed once this long has passed since the previous flush.
    pub debounce_window: Duration,

    /// Pause inserted between sequential per-zone steps so long adapter
    /// lists don't monopolize the executor.
    pub step_pause: Duration,

    /// Model compatibility version stamped on uploaded records. When
    /// non-zero, fetched records carrying a higher version abort the sync
    /// with `HigherModelVersionFound`.
    pub compatibility_version: u32,

    /// Upload local changes, or only download.
    pub sync_mode: SyncMode,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 400,
            batch_size_step: 5,
            max_upload_retries: 2,
            debounce_window: Duration::from_secs(3),
            step_pause: Duration::from_millis(10),
            compatibility_version: 0,
            sync_mode: SyncMode::Sync,
        }
    }
}
