use std::time::Duration;

/// Configuration for one lock, immutable after engine construction.
///
/// Pure data; location identifiers are validated lazily by the store
/// backend that receives them.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Key naming the unit of work to serialize
    pub key: String,
    /// Container the lock records live in
    pub container: String,
    /// Directory within the container
    pub directory: String,
    /// How long one acquisition holds the lease without renewal.
    /// Keep this between 1 and 60 seconds; split work that needs more.
    pub lease_duration: Duration,
    /// Fixed delay between failed acquisition attempts
    pub retry_wait: Duration,
    /// Retries after the first attempt before giving up
    pub retry_times: u32,
}

impl LockOptions {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            container: "stowlocks".to_string(),
            directory: "nodes".to_string(),
            lease_duration: Duration::from_secs(30),
            retry_wait: Duration::from_millis(200),
            retry_times: 10,
        }
    }

    pub fn lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration = duration;
        self
    }

    pub fn retry_wait(mut self, wait: Duration) -> Self {
        self.retry_wait = wait;
        self
    }

    pub fn retry_times(mut self, times: u32) -> Self {
        self.retry_times = times;
        self
    }

    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    pub fn directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Store path of the persisted lease record. Container names are
    /// lowercased to match object-store naming rules.
    pub fn blob_path(&self) -> String {
        format!(
            "{}/{}/{}",
            self.container.to_lowercase(),
            self.directory,
            self.key
        )
    }
}
