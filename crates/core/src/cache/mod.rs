//! Presence cache: a small key/value store with TTLs and sets.
//!
//! The cache records which pulls have a located remote artifact (`gs:seen`),
//! the descriptor list for each of them (`gs:file:<id>`), point-in-time
//! copies of pull metadata (`pull:<id>`) and short-lived locks.
//!
//! Entries expire passively: an expired entry is simply never returned.
//! `multi_set` writes in batches; a batch is applied as a unit, but a failure
//! part way through leaves earlier batches written. Callers that care read
//! the keys back.

mod error;
pub mod keys;
mod lock;
mod memory;
mod sqlite;

pub use error::CacheError;
pub use lock::CacheLock;
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use std::time::Duration;

/// Default number of entries written per `multi_set` batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Trait for presence cache backends.
pub trait PresenceCache: Send + Sync {
    /// Get a live value.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a value, replacing any previous one. `None` means no expiry.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Set a value only if no live value exists. Returns whether it was set.
    fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, CacheError>;

    /// Set many values, `batch_size` entries per write.
    fn multi_set(
        &self,
        items: &[(String, String)],
        batch_size: usize,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Delete a key (value or set). Returns whether anything was removed.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Replace the expiry of a live value. Returns false if the key is absent.
    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Live value keys starting with `prefix`.
    fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    fn is_member(&self, set_key: &str, member: &str) -> Result<bool, CacheError>;

    /// Add to a set. Returns whether the member was new.
    fn add_member(&self, set_key: &str, member: &str) -> Result<bool, CacheError>;

    /// Remove from a set. Returns whether the member was present.
    fn remove_member(&self, set_key: &str, member: &str) -> Result<bool, CacheError>;

    fn members(&self, set_key: &str) -> Result<Vec<String>, CacheError>;
}

/// Convert a TTL into an absolute expiry, in milliseconds since the epoch.
pub(crate) fn expiry_millis(now: chrono::DateTime<chrono::Utc>, ttl: Option<Duration>) -> Option<i64> {
    let ttl = chrono::Duration::from_std(ttl?).ok()?;
    now.checked_add_signed(ttl).map(|at| at.timestamp_millis())
}
