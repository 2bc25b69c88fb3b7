use std::time::Duration;

use crate::error::StoreError;
use crate::types::LeaseState;

/// Contract every object-store backend must satisfy.
///
/// Each operation is a blocking remote call. Mutations against a held
/// object must present the holder token as proof; every write is a
/// compare-and-swap on holder identity, never an unconditional
/// overwrite. Backends map their native error codes onto the
/// `StoreError` variants named here; anything else becomes
/// `StoreError::Transport` and aborts the caller.
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists at `path`.
    fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Create the object only if absent. Fails with `AlreadyExists`
    /// when a concurrent create won the race.
    fn create_if_absent(&self, path: &str, content: &str) -> Result<(), StoreError>;

    /// Read the object's content. Fails with `NotFound` when absent.
    fn read(&self, path: &str) -> Result<String, StoreError>;

    /// Overwrite the object's content. When the object's lease is held
    /// by a token other than `proof`, fails with `OwnershipConflict`.
    fn write(&self, path: &str, content: &str, proof: Option<&str>) -> Result<(), StoreError>;

    /// Current lease state of the object.
    fn lease_state(&self, path: &str) -> Result<LeaseState, StoreError>;

    /// Take a fresh lease for `duration` under `proposed`. Returns the
    /// granted token. Fails with `LeaseAlreadyPresent` while another
    /// holder's lease is active.
    fn acquire_lease(
        &self,
        path: &str,
        duration: Duration,
        proposed: &str,
    ) -> Result<String, StoreError>;

    /// Replace the holder token of an active lease, presenting the
    /// previously issued token as proof. Fails with
    /// `OwnershipConflict` on mismatch.
    fn change_lease(&self, path: &str, current: &str, proposed: &str)
    -> Result<String, StoreError>;

    /// Release the lease held under `current`. Fails with
    /// `OwnershipConflict` on mismatch.
    fn release_lease(&self, path: &str, current: &str) -> Result<(), StoreError>;

    /// Extend the held lease's expiry by `extension` from now. Fails
    /// with `OwnershipConflict` when the lease lapsed or was taken
    /// over.
    fn renew_lease(&self, path: &str, current: &str, extension: Duration)
    -> Result<(), StoreError>;

    /// Delete the object if it exists. Returns whether anything was
    /// deleted.
    fn delete_if_exists(&self, path: &str) -> Result<bool, StoreError>;
}
