use serde::{Deserialize, Serialize};

/// Remote lease state as reported by the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseState {
    /// No lease has ever been taken, or the last one was released
    Available,
    /// A lease is currently held by some node
    Leased,
    /// A lease was held but its duration elapsed without renewal
    Expired,
}

impl LeaseState {
    /// True when a fresh acquisition is allowed to proceed.
    pub fn is_acquirable(self) -> bool {
        !matches!(self, LeaseState::Leased)
    }
}

/// Outcome of one acquisition attempt. Contention is an expected
/// result, not an error; the retry loop switches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The lease was taken and the record persisted under the new token
    Acquired,
    /// Another holder's lease is active; retry after the backoff delay
    Contended,
}
