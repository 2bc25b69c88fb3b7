use std::time::Duration;

use thiserror::Error;

/// Failures at the object-store adapter boundary.
///
/// Store-specific error codes are reclassified into these variants by
/// each backend; the lock engine matches on them instead of catching
/// broad errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional create lost the race to a concurrent creator
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// The requested object does not exist
    #[error("object not found: {0}")]
    NotFound(String),

    /// A fresh acquisition raced against an active holder
    #[error("a lease is already present on {0}")]
    LeaseAlreadyPresent(String),

    /// The presented proof token no longer matches the remote holder
    #[error("lease ownership conflict on {0}")]
    OwnershipConflict(String),

    /// Any other store or transport failure; never retried
    #[error("store transport failure: {0}")]
    Transport(String),
}

/// Failures surfaced by the lock engine.
#[derive(Debug, Error)]
pub enum LockError {
    /// A write or lease operation failed because another node took
    /// over the lease; distinct from the store being unreachable
    #[error("lease for key '{key}' was lost to another holder")]
    LeaseLost { key: String },

    /// Renewal interval must be strictly smaller than the lease
    /// duration; caller programming error, never sent to the store
    #[error("renew interval {interval:?} must be smaller than the lease duration {lease_duration:?}")]
    InvalidRenewInterval {
        interval: Duration,
        lease_duration: Duration,
    },

    /// The lock was closed; no further operations are possible
    #[error("lock is closed")]
    Closed,

    /// The critical-section callback failed; the lease was released
    /// before this was surfaced
    #[error("critical section failed: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The persisted lease record could not be encoded or decoded
    #[error("lease record encoding failed")]
    Encoding(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
