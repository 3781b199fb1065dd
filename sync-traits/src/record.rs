//! Record, Zone and Token Types
//!
//! Shared value types exchanged between the sync engine, the remote backend
//! and local model adapters. Record payloads are opaque to the engine; only
//! identity and origin metadata are inspected.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a record zone (a remote partition with its own change feed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordZoneId {
    /// Name of the zone within its owner's database.
    pub zone_name: String,
    /// Owner of the zone. Zones with the same name under different owners
    /// are distinct partitions.
    pub owner_name: String,
}

impl RecordZoneId {
    /// Create a zone identifier.
    pub fn new(zone_name: impl Into<String>, owner_name: impl Into<String>) -> Self {
        Self {
            zone_name: zone_name.into(),
            owner_name: owner_name.into(),
        }
    }
}

impl fmt::Display for RecordZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_name, self.zone_name)
    }
}

/// Identifier of a record within a zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Unique name of the record within its zone.
    pub record_name: String,
    /// Zone the record belongs to.
    pub zone_id: RecordZoneId,
}

impl RecordId {
    /// Create a record identifier.
    pub fn new(record_name: impl Into<String>, zone_id: RecordZoneId) -> Self {
        Self {
            record_name: record_name.into(),
            zone_id,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone_id, self.record_name)
    }
}

/// Opaque, backend-issued change token.
///
/// A token marks a position in a change feed and is only valid for the scope
/// (one zone, or the whole database) that issued it. The engine stores and
/// replays tokens; it never constructs or inspects them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeToken(String);

impl ChangeToken {
    /// Wrap a backend-issued token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token value, for persistence.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChangeToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Origin metadata stamped on every uploaded record.
///
/// Used to skip a device's own changes during fetch and to detect records
/// written by a newer, incompatible model version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Identifier of the device that last uploaded the record.
    pub device_identifier: Option<String>,
    /// Model compatibility version of the uploading client.
    pub model_version: u32,
}

/// A record as exchanged with the remote backend.
///
/// The payload encoding is owned by the model adapters; the engine treats it
/// as opaque bytes and only reads identity, the optimistic-concurrency change
/// tag, and origin metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    /// Identifier of the record.
    pub id: RecordId,
    /// Application-defined record type.
    pub record_type: String,
    /// Backend-issued version tag used for conflict detection. `None` for
    /// records that have never been saved remotely.
    pub change_tag: Option<String>,
    /// Origin metadata.
    pub metadata: RecordMetadata,
    /// Opaque encoded record body.
    pub payload: Bytes,
}

impl RemoteRecord {
    /// Create a record with empty metadata and no change tag.
    pub fn new(id: RecordId, record_type: impl Into<String>, payload: Bytes) -> Self {
        Self {
            id,
            record_type: record_type.into(),
            change_tag: None,
            metadata: RecordMetadata::default(),
            payload,
        }
    }

    /// Zone this record belongs to.
    pub fn zone_id(&self) -> &RecordZoneId {
        &self.id.zone_id
    }
}
