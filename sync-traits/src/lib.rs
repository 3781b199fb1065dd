//! # Sync Contracts
//!
//! Contracts between the sync engine and its collaborators.
//!
//! ## Overview
//!
//! This crate defines the three seams of the synchronization system:
//!
//! - [`RemoteDatabase`](remote::RemoteDatabase): the record-oriented remote
//!   backend: change-token pagination at database and zone scope, batched
//!   writes with conflict signaling, zone management.
//! - [`ModelAdapter`](adapter::ModelAdapter) /
//!   [`AdapterProvider`](adapter::AdapterProvider): the per-zone local
//!   store: dirty-set queries, downloaded-change application, durable
//!   change-token persistence.
//! - [`KeyValueStore`](keyvalue::KeyValueStore): small settings persistence
//!   for synchronizer-owned state (database token, device identifier).
//!
//! Shared value types (zones, records, tokens, origin metadata) live in
//! [`record`]; the backend error taxonomy lives in [`error`].
//!
//! ## Thread Safety
//!
//! All contracts require `Send + Sync`. The engine invokes adapters
//! sequentially from a single logical context; implementations may carry
//! their own internal synchronization.

pub mod adapter;
pub mod error;
pub mod keyvalue;
pub mod record;
pub mod remote;

pub use adapter::{AdapterError, AdapterProvider, AdapterResult, ModelAdapter};
pub use error::{RemoteError, RemoteResult};
pub use keyvalue::{KeyValueStore, MemoryKeyValueStore};
pub use record::{ChangeToken, RecordId, RecordMetadata, RecordZoneId, RemoteRecord};
pub use remote::{
    DatabaseChanges, ModifyRecordsResult, RecordZone, RemoteDatabase, ZoneChanges,
    ZoneFetchRequest,
};
