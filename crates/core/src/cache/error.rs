//! Error types for the cache module.

use thiserror::Error;

/// Errors that can occur while talking to the presence cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend storage failure.
    #[error("Cache database error: {0}")]
    Database(String),

    /// A cached payload could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// Another process holds the named lock.
    #[error("Lock already held: {0}")]
    LockHeld(String),

    /// A thread panicked while holding the cache mutex.
    #[error("Cache state poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
