//! SQLite-backed `ObjectStore` implementation.
//! A database file shared between independent OS processes gives them
//! real mutual exclusion through the same lease contract.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! stowlock-core = { path = "../stowlock-core", features = ["sqlite"] }
//! ```

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;
use crate::infrastructure::ObjectStore;
use crate::types::LeaseState;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A persistent object store backed by SQLite.
///
/// Uses WAL mode for concurrent read performance. Lease expiry is
/// tracked as a unix-millisecond deadline per object.
pub struct SqliteObjectStore {
    conn: Mutex<Connection>,
}

impl SqliteObjectStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Leases do not survive the
    /// process; meant for tests.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS objects (
                path             TEXT PRIMARY KEY,
                content          TEXT NOT NULL,
                lease_token      TEXT,
                lease_expires_at INTEGER
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lease columns for `path`: `(token, expires_at)` when a lease
    /// was ever granted and not yet released.
    fn lease_row(
        conn: &Connection,
        path: &str,
    ) -> Result<Option<(String, u64)>, rusqlite::Error> {
        conn.query_row(
            "SELECT lease_token, lease_expires_at FROM objects WHERE path = ?1",
            params![path],
            |row| {
                let token: Option<String> = row.get(0)?;
                let expires: Option<u64> = row.get(1)?;
                Ok(token.zip(expires))
            },
        )
        .optional()
        .map(|row| row.flatten())
    }

    fn transport(e: rusqlite::Error) -> StoreError {
        StoreError::Transport(e.to_string())
    }
}

impl ObjectStore for SqliteObjectStore {
    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT 1 FROM objects WHERE path = ?1",
            params![path],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
        .map_err(Self::transport)
    }

    fn create_if_absent(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                "INSERT INTO objects (path, content) VALUES (?1, ?2)
                 ON CONFLICT (path) DO NOTHING",
                params![path, content],
            )
            .map_err(Self::transport)?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        Ok(())
    }

    fn read(&self, path: &str) -> Result<String, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT content FROM objects WHERE path = ?1",
            params![path],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(Self::transport)?
        .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn write(&self, path: &str, content: &str, proof: Option<&str>) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        if let Some((token, expires_at)) = Self::lease_row(&conn, path).map_err(Self::transport)?
        {
            if now_ms() < expires_at && proof != Some(token.as_str()) {
                return Err(StoreError::OwnershipConflict(path.to_string()));
            }
        }
        conn.execute(
            "INSERT INTO objects (path, content) VALUES (?1, ?2)
             ON CONFLICT (path) DO UPDATE SET content = excluded.content",
            params![path, content],
        )
        .map_err(Self::transport)?;
        Ok(())
    }

    fn lease_state(&self, path: &str) -> Result<LeaseState, StoreError> {
        let conn = self.conn.lock().unwrap();
        if !conn
            .query_row(
                "SELECT 1 FROM objects WHERE path = ?1",
                params![path],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
            .map_err(Self::transport)?
        {
            return Err(StoreError::NotFound(path.to_string()));
        }

        Ok(match Self::lease_row(&conn, path).map_err(Self::transport)? {
            None => LeaseState::Available,
            Some((_, expires_at)) if now_ms() < expires_at => LeaseState::Leased,
            Some(_) => LeaseState::Expired,
        })
    }

    fn acquire_lease(
        &self,
        path: &str,
        duration: Duration,
        proposed: &str,
    ) -> Result<String, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = now_ms();

        match Self::lease_row(&conn, path).map_err(Self::transport)? {
            Some((_, expires_at)) if now < expires_at => {
                return Err(StoreError::LeaseAlreadyPresent(path.to_string()));
            }
            _ => {}
        }

        let expires = now + duration.as_millis() as u64;
        let updated = conn
            .execute(
                "UPDATE objects SET lease_token = ?1, lease_expires_at = ?2 WHERE path = ?3",
                params![proposed, expires, path],
            )
            .map_err(Self::transport)?;
        if updated == 0 {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(proposed.to_string())
    }

    fn change_lease(
        &self,
        path: &str,
        current: &str,
        proposed: &str,
    ) -> Result<String, StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE objects SET lease_token = ?1
                 WHERE path = ?2 AND lease_token = ?3 AND lease_expires_at > ?4",
                params![proposed, path, current, now_ms()],
            )
            .map_err(Self::transport)?;
        if updated == 0 {
            return Err(StoreError::OwnershipConflict(path.to_string()));
        }
        Ok(proposed.to_string())
    }

    fn release_lease(&self, path: &str, current: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE objects SET lease_token = NULL, lease_expires_at = NULL
                 WHERE path = ?1 AND lease_token = ?2",
                params![path, current],
            )
            .map_err(Self::transport)?;
        if updated == 0 {
            return Err(StoreError::OwnershipConflict(path.to_string()));
        }
        Ok(())
    }

    fn renew_lease(
        &self,
        path: &str,
        current: &str,
        extension: Duration,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = now_ms();
        let expires = now + extension.as_millis() as u64;
        let updated = conn
            .execute(
                "UPDATE objects SET lease_expires_at = ?1
                 WHERE path = ?2 AND lease_token = ?3 AND lease_expires_at > ?4",
                params![expires, path, current, now],
            )
            .map_err(Self::transport)?;
        if updated == 0 {
            return Err(StoreError::OwnershipConflict(path.to_string()));
        }
        Ok(())
    }

    fn delete_if_exists(&self, path: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute("DELETE FROM objects WHERE path = ?1", params![path])
            .map_err(Self::transport)?;
        Ok(deleted > 0)
    }
}
