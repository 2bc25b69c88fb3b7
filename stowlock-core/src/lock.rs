//! Lock engine and critical-section context.
//!
//! `ObjectLock` drives the acquisition/retry state machine:
//! `Idle -> FetchingOrCreatingLease -> Acquiring -> (Holding ->
//! Releasing) -> Idle`, with a bounded retry edge back to `Acquiring`
//! while attempts remain. Cross-process exclusivity comes entirely from
//! the store's lease primitive; the in-process gate only spares local
//! callers redundant remote round-trips.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use nanoid::nanoid;
use tracing::{debug, trace, warn};

use crate::error::{LockError, StoreError};
use crate::infrastructure::ObjectStore;
use crate::options::LockOptions;
use crate::types::{Acquisition, LeaseRecord};

/// Error type critical-section callbacks may fail with.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// A named distributed lock coordinated through a shared object store.
///
/// One instance is bound to exactly one key and is safe to share among
/// concurrent local callers. Do not construct two instances for the
/// same key within one process and expect the gate to serialize them;
/// exclusivity then relies entirely on the remote lease primitive.
pub struct ObjectLock {
    options: LockOptions,
    store: Arc<dyn ObjectStore>,
    gate: Mutex<()>,
    closed: AtomicBool,
}

impl ObjectLock {
    pub fn new(options: LockOptions, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            options,
            store,
            gate: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Run `work` under the lock.
    ///
    /// Makes up to `retry_times + 1` acquisition attempts, sleeping
    /// `retry_wait` between failed ones. Whatever lease state is held
    /// is released before every retry and before every return, the
    /// callback failing included. Returns `Ok(None)` when every
    /// attempt was contended and the callback never ran.
    pub fn execute<T, F>(&self, work: F) -> Result<Option<T>, LockError>
    where
        F: FnOnce(&LockContext<'_>) -> Result<T, CallbackError>,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LockError::Closed);
        }
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.options.blob_path();
        let mut record = self.resolve_record(&path)?;
        let mut work = Some(work);
        let mut performed = false;
        let mut value = None;

        let mut attempts = 0u32;
        while !performed && attempts <= self.options.retry_times {
            attempts += 1;
            let attempt = self.try_acquire(&path, &mut record);
            let mut failure = None;

            if let Ok(Acquisition::Acquired) = attempt {
                performed = true;
                debug!(key = %self.options.key, epoch = record.epoch, "lease acquired");
                let context = LockContext {
                    lock: self,
                    token: record.token.clone(),
                    epoch: record.epoch,
                    offset: record.offset.clone(),
                };
                if let Some(work) = work.take() {
                    match work(&context) {
                        Ok(v) => value = Some(v),
                        Err(e) => failure = Some(LockError::Callback(e)),
                    }
                }
            }

            // Cleanup runs unconditionally so no lease is left dangling.
            let released = self.release_held(&path, &mut record);
            if let Err(e) = &released {
                // The acquisition or callback error wins; don't let a
                // cleanup failure vanish silently.
                if attempt.is_err() || failure.is_some() {
                    warn!(key = %self.options.key, error = %e, "release failed during cleanup");
                }
            }
            attempt?;
            if let Some(err) = failure {
                return Err(err);
            }
            released?;

            if !performed {
                trace!(
                    key = %self.options.key,
                    attempt = attempts,
                    "lease contended, backing off"
                );
                thread::sleep(self.options.retry_wait);
            }
        }

        Ok(value)
    }

    /// Delete the persisted lease record entirely, tearing the lock
    /// down. Returns whether anything was deleted.
    pub fn release_lock(&self) -> Result<bool, LockError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LockError::Closed);
        }
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.options.blob_path();
        if !self.store.exists(&path)? {
            return Ok(false);
        }
        Ok(self.store.delete_if_exists(&path)?)
    }

    /// Close the lock permanently. First caller wins; subsequent calls
    /// are no-ops. After closing, `execute` and `release_lock` fail
    /// with `LockError::Closed`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(key = %self.options.key, "lock closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolve the lease record for the configured key, creating it
    /// when absent. Losing the create race to another node falls back
    /// to fetching that node's record; any other store error is fatal.
    fn resolve_record(&self, path: &str) -> Result<LeaseRecord, LockError> {
        if self.store.exists(path)? {
            return self.fetch_record(path);
        }

        let record = LeaseRecord::new(self.options.key.clone());
        match self.store.create_if_absent(path, &record.to_json()?) {
            Ok(()) => Ok(record),
            Err(StoreError::AlreadyExists(_)) | Err(StoreError::LeaseAlreadyPresent(_)) => {
                self.fetch_record(path)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn fetch_record(&self, path: &str) -> Result<LeaseRecord, LockError> {
        let content = self.store.read(path)?;
        let mut record = LeaseRecord::from_json(&content)?;
        // The persisted token belongs to whichever node wrote the
        // record last. It is not proof of ownership for this engine;
        // presenting it would steal an active holder's lease. Only a
        // token obtained through our own acquisition counts.
        record.token.clear();
        Ok(record)
    }

    /// One acquisition attempt.
    ///
    /// A held remote lease can only be taken over by presenting the
    /// previously known token; without one this is plain contention.
    /// An unheld lease is acquired fresh, where losing the race to a
    /// concurrent acquirer is also contention. Either way a success
    /// bumps the epoch and persists the record under the new token.
    pub(crate) fn try_acquire(
        &self,
        path: &str,
        record: &mut LeaseRecord,
    ) -> Result<Acquisition, LockError> {
        let proposed = nanoid!();
        let state = self.store.lease_state(path)?;

        let token = if !state.is_acquirable() {
            if !record.is_held() {
                return Ok(Acquisition::Contended);
            }
            match self.store.change_lease(path, &record.token, &proposed) {
                Ok(token) => token,
                Err(StoreError::OwnershipConflict(_)) => return Err(self.lease_lost()),
                Err(e) => return Err(e.into()),
            }
        } else {
            match self
                .store
                .acquire_lease(path, self.options.lease_duration, &proposed)
            {
                Ok(token) => token,
                Err(StoreError::LeaseAlreadyPresent(_)) => return Ok(Acquisition::Contended),
                Err(e) => return Err(e.into()),
            }
        };

        record.token = token;
        record.increment_epoch();

        let proof = record.token.clone();
        match self.store.write(path, &record.to_json()?, Some(&proof)) {
            Ok(()) => Ok(Acquisition::Acquired),
            Err(StoreError::OwnershipConflict(_)) => Err(self.lease_lost()),
            Err(e) => Err(e.into()),
        }
    }

    /// Release whatever lease state is currently held.
    ///
    /// Writes back a token-cleared copy of the record first, still
    /// under the old token's proof, so a concurrent reader never
    /// observes a stale non-empty token once release completes. No-op
    /// when no token is held.
    pub(crate) fn release_held(&self, path: &str, record: &mut LeaseRecord) -> Result<bool, LockError> {
        if !record.is_held() {
            return Ok(false);
        }

        let token = record.token.clone();
        let released = record.released_copy();
        match self.store.write(path, &released.to_json()?, Some(&token)) {
            Ok(()) => {}
            Err(StoreError::OwnershipConflict(_)) => return Err(self.lease_lost()),
            Err(e) => return Err(e.into()),
        }
        match self.store.release_lease(path, &token) {
            Ok(()) => {}
            Err(StoreError::OwnershipConflict(_)) => return Err(self.lease_lost()),
            Err(e) => return Err(e.into()),
        }

        record.token.clear();
        debug!(key = %self.options.key, epoch = record.epoch, "lease released");
        Ok(true)
    }

    /// Renew the currently held lease. Any store rejection reports
    /// `false`; the caller must abort its critical section then, since
    /// continuing without a valid lease voids exclusivity.
    fn renew_held(&self, token: &str, interval: Duration) -> Result<bool, LockError> {
        if interval >= self.options.lease_duration {
            return Err(LockError::InvalidRenewInterval {
                interval,
                lease_duration: self.options.lease_duration,
            });
        }

        let path = self.options.blob_path();
        match self.store.renew_lease(&path, token, interval) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(key = %self.options.key, error = %e, "lease renewal rejected");
                Ok(false)
            }
        }
    }

    fn lease_lost(&self) -> LockError {
        warn!(key = %self.options.key, "lease lost to another holder");
        LockError::LeaseLost {
            key: self.options.key.clone(),
        }
    }
}

/// Handed to the critical-section callback while the lease is held.
/// Borrows the engine, never owns it.
pub struct LockContext<'a> {
    lock: &'a ObjectLock,
    token: String,
    epoch: u64,
    offset: Option<String>,
}

impl LockContext<'_> {
    /// Extend the held lease so long-running work can keep going
    /// without releasing. `interval` must be strictly smaller than the
    /// configured lease duration. Returns `false` when the store
    /// rejects the renewal, which means another node may already hold
    /// the lease.
    pub fn renew_lease(&self, interval: Duration) -> Result<bool, LockError> {
        self.lock.renew_held(&self.token, interval)
    }

    /// Fencing value of this acquisition. Strictly greater than the
    /// epoch of every earlier acquisition of the same key; downstream
    /// consumers can use it to reject writes from a dispossessed
    /// former holder.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Caller-defined cursor carried in the lease record, if any.
    pub fn offset(&self) -> Option<&str> {
        self.offset.as_deref()
    }
}
