//! Remote backend error taxonomy.
//!
//! Transports convert backend-specific failures into [`RemoteError`] so the
//! engine can classify them without knowing the wire protocol. Batched write
//! operations report per-record failures through [`RemoteError::PartialFailure`];
//! the classification helpers look through partial failures so a batch
//! containing a single conflicting or oversized item classifies the same way
//! as a whole-batch failure.

use crate::record::RecordId;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("Record zone not found")]
    ZoneNotFound,

    #[error("Record zone was deleted by the user")]
    ZoneDeleted,

    #[error("Change token expired; a full fetch is required")]
    ChangeTokenExpired,

    #[error("Batch exceeds the backend's size limit")]
    LimitExceeded,

    #[error("Server record version differs from the version last observed")]
    ServerRecordChanged,

    #[error("Record not found on the server")]
    RecordNotFound,

    #[error("Some records in the batch failed")]
    PartialFailure {
        item_errors: Vec<(RecordId, RemoteError)>,
    },

    #[error("Backend service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl RemoteError {
    /// True for a conflict (the server holds a different record version),
    /// either at the top level or for any item of a partial failure.
    pub fn is_conflict(&self) -> bool {
        self.contains(|e| matches!(e, RemoteError::ServerRecordChanged))
    }

    /// True when the batch (or any item in it) exceeded the backend's limit.
    pub fn is_limit_exceeded(&self) -> bool {
        self.contains(|e| matches!(e, RemoteError::LimitExceeded))
    }

    /// True when the target zone is gone, whether reported as missing or as
    /// deleted by the user.
    pub fn is_zone_not_found_or_deleted(&self) -> bool {
        matches!(self, RemoteError::ZoneNotFound | RemoteError::ZoneDeleted)
    }

    /// True when the change token used for a fetch is no longer valid.
    pub fn is_token_expired(&self) -> bool {
        matches!(self, RemoteError::ChangeTokenExpired)
    }

    /// Record ids of partial-failure items matching `predicate`.
    pub fn item_ids_where(&self, predicate: impl Fn(&RemoteError) -> bool) -> Vec<RecordId> {
        match self {
            RemoteError::PartialFailure { item_errors } => item_errors
                .iter()
                .filter(|(_, e)| predicate(e))
                .map(|(id, _)| id.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn contains(&self, predicate: impl Fn(&RemoteError) -> bool + Copy) -> bool {
        if predicate(self) {
            return true;
        }
        match self {
            RemoteError::PartialFailure { item_errors } => {
                item_errors.iter().any(|(_, e)| predicate(e))
            }
            _ => false,
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
