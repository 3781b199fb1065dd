//! # Sync Engine
//!
//! Incremental synchronization between a local, partitioned record store and
//! a remote record-oriented backend.
//!
//! ## Overview
//!
//! This crate drives change-token-based synchronization against the
//! contracts defined in `sync-traits`:
//! - Fetching remote deltas at database and zone scope, with pagination
//! - Coalescing streamed record changes before they hit local storage
//! - Merging imports and persisting per-zone change tokens
//! - Uploading dirty records and tombstones with adaptive batch sizing,
//!   conflict force-merging, and bounded retries
//! - Reconciling tokens after upload so concurrent remote writes are never
//!   silently skipped
//!
//! ## Components
//!
//! - **Synchronizer** (`synchronizer`): phase state machine and session
//!   ownership
//! - **Fetch** (`fetch`): two-level change retrieval and the merge step
//! - **Upload** (`upload`): zone setup, record and deletion upload
//! - **Reconcile** (`reconcile`): post-upload token confirmation
//! - **Change Coalescer** (`coalesce`): debounced apply-batch buffering
//! - **Batch-Size Controller** (`batch`): halve-on-limit, step-on-success
//! - **Sequential Runner** (`sequence`): ordered per-zone iteration

pub mod batch;
pub mod coalesce;
pub mod config;
pub mod error;
mod fetch;
mod reconcile;
pub mod sequence;
pub mod session;
pub mod synchronizer;
mod upload;

pub use batch::BatchSizeController;
pub use coalesce::ChangeCoalescer;
pub use config::{SyncMode, SynchronizerConfig};
pub use error::{SyncError, SyncResult};
pub use sequence::{run_sequential, SequenceError};
pub use session::SyncPhase;
pub use synchronizer::Synchronizer;
