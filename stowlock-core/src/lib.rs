//! # stowlock-core
//!
//! Lease-based distributed lock kernel. Turns an object store's
//! primitive lease operations (acquire, change, release, conditional
//! write) into a named mutual-exclusion lock with epoch fencing,
//! in-process serialization, and bounded retry.

pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod lock;
pub mod options;
pub mod types;

#[cfg(test)]
#[path = "infrastructure_test.rs"]
mod infrastructure_test;
