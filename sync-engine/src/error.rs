use sync_traits::{AdapterError, RemoteError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("A synchronization is already in progress")]
    AlreadySyncing,

    #[error("Synchronization is disabled")]
    NotAllowed,

    #[error("Synchronization cancelled")]
    Cancelled,

    #[error("Remote records were uploaded with a higher model version; update required")]
    HigherModelVersionFound,

    #[error("Record not found")]
    RecordNotFound,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    LocalStorage(#[from] AdapterError),
}

impl SyncError {
    /// Fold transport-level cancellation into the engine's `Cancelled` so a
    /// session that was cancelled mid-operation reports one terminal cause.
    pub(crate) fn normalized(self) -> Self {
        match self {
            SyncError::Remote(RemoteError::Cancelled) => SyncError::Cancelled,
            other => other,
        }
    }

    /// True for errors the upload phase may retry (conflict and batch-limit
    /// classes only).
    pub(crate) fn is_retryable_upload_error(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_conflict() || e.is_limit_exceeded(),
            _ => false,
        }
    }
}

impl From<crate::sequence::SequenceError<SyncError>> for SyncError {
    fn from(error: crate::sequence::SequenceError<SyncError>) -> Self {
        match error {
            crate::sequence::SequenceError::Cancelled => SyncError::Cancelled,
            crate::sequence::SequenceError::Step(e) => e,
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
