//! In-memory `ObjectStore` used by tests and the `memory` CLI backend.
//!
//! Honors the full conditional-write/lease contract with real
//! wall-clock expiry, so engines sharing one instance contend exactly
//! as they would against a remote store. Also exposes two test
//! affordances: forcing a lease to lapse and counting state polls.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::StoreError;
use crate::infrastructure::ObjectStore;
use crate::types::LeaseState;

#[derive(Debug, Clone)]
struct Grant {
    token: String,
    expires_at: Instant,
}

impl Grant {
    fn is_active(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    content: String,
    grant: Option<Grant>,
}

pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    state_polls: AtomicU64,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            state_polls: AtomicU64::new(0),
        }
    }

    /// Force the lease on `path` to lapse immediately. Returns whether
    /// an active lease was expired.
    pub fn expire_lease(&self, path: &str) -> bool {
        let mut objects = self.objects.lock().unwrap();
        match objects.get_mut(path).and_then(|o| o.grant.as_mut()) {
            Some(grant) if grant.is_active() => {
                grant.expires_at = Instant::now()
                    .checked_sub(Duration::from_millis(1))
                    .unwrap_or_else(Instant::now);
                true
            }
            _ => false,
        }
    }

    /// How many times `lease_state` has been polled. Each engine
    /// acquisition attempt starts with exactly one poll.
    pub fn state_polls(&self) -> u64 {
        self.state_polls.load(Ordering::SeqCst)
    }

    fn conflict(path: &str) -> StoreError {
        StoreError::OwnershipConflict(path.to_string())
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects.contains_key(path))
    }

    fn create_if_absent(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(path) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                content: content.to_string(),
                grant: None,
            },
        );
        Ok(())
    }

    fn read(&self, path: &str) -> Result<String, StoreError> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(path)
            .map(|o| o.content.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn write(&self, path: &str, content: &str, proof: Option<&str>) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects.entry(path.to_string()).or_insert(StoredObject {
            content: String::new(),
            grant: None,
        });

        // An active lease gates every write on presenting its token.
        if let Some(grant) = &object.grant {
            if grant.is_active() && proof != Some(grant.token.as_str()) {
                return Err(Self::conflict(path));
            }
        }

        object.content = content.to_string();
        Ok(())
    }

    fn lease_state(&self, path: &str) -> Result<LeaseState, StoreError> {
        self.state_polls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        let object = objects
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(match &object.grant {
            None => LeaseState::Available,
            Some(grant) if grant.is_active() => LeaseState::Leased,
            Some(_) => LeaseState::Expired,
        })
    }

    fn acquire_lease(
        &self,
        path: &str,
        duration: Duration,
        proposed: &str,
    ) -> Result<String, StoreError> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        if let Some(grant) = &object.grant {
            if grant.is_active() {
                return Err(StoreError::LeaseAlreadyPresent(path.to_string()));
            }
        }

        object.grant = Some(Grant {
            token: proposed.to_string(),
            expires_at: Instant::now() + duration,
        });
        Ok(proposed.to_string())
    }

    fn change_lease(
        &self,
        path: &str,
        current: &str,
        proposed: &str,
    ) -> Result<String, StoreError> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        match object.grant.as_mut() {
            Some(grant) if grant.is_active() && grant.token == current => {
                grant.token = proposed.to_string();
                Ok(proposed.to_string())
            }
            _ => Err(Self::conflict(path)),
        }
    }

    fn release_lease(&self, path: &str, current: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        match &object.grant {
            Some(grant) if grant.token == current => {
                object.grant = None;
                Ok(())
            }
            _ => Err(Self::conflict(path)),
        }
    }

    fn renew_lease(
        &self,
        path: &str,
        current: &str,
        extension: Duration,
    ) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        match object.grant.as_mut() {
            Some(grant) if grant.is_active() && grant.token == current => {
                grant.expires_at = Instant::now() + extension;
                Ok(())
            }
            _ => Err(Self::conflict(path)),
        }
    }

    fn delete_if_exists(&self, path: &str) -> Result<bool, StoreError> {
        let mut objects = self.objects.lock().unwrap();
        Ok(objects.remove(path).is_some())
    }
}
