use serde::{Deserialize, Serialize};

use crate::error::LockError;

/// Persisted ownership state for one locked key.
///
/// The remote store is the source of truth for whether the lease is
/// actually held; a deserialized record is a cache of the last known
/// state. `token` non-empty means the underlying lease was held by
/// some node when the record was written, not necessarily this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Identity of the locked resource, immutable after creation
    pub key: String,
    /// Fencing counter, incremented exactly once per successful
    /// acquisition (steals included), never decremented
    pub epoch: u64,
    /// Opaque holder token issued by the store; empty when unheld
    #[serde(default)]
    pub token: String,
    /// Caller-defined cursor, opaque to the engine, round-tripped
    /// unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

impl LeaseRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            epoch: 0,
            token: String::new(),
            offset: None,
        }
    }

    /// Whether the last known state had a holder.
    pub fn is_held(&self) -> bool {
        !self.token.is_empty()
    }

    /// Bump the fencing counter. Called once each time the lease is
    /// acquired or stolen by a new holder.
    pub fn increment_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Copy of this record with the holder token cleared, written back
    /// just before the lease itself is released so readers never see a
    /// stale token after release completes.
    pub fn released_copy(&self) -> Self {
        Self {
            token: String::new(),
            ..self.clone()
        }
    }

    pub fn to_json(&self) -> Result<String, LockError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self, LockError> {
        Ok(serde_json::from_str(content)?)
    }
}
