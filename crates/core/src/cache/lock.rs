//! TTL-scoped mutual exclusion on top of the presence cache.

use std::sync::Arc;

use tracing::{debug, warn};

use super::keys::{lock_key, LOCK_TTL};
use super::{CacheError, PresenceCache};

/// A held `lock:<name>` key.
///
/// The lock is released explicitly with [`CacheLock::release`]. If the holder
/// never gets there (crash, early error return) the key expires on its own
/// after [`LOCK_TTL`].
#[must_use = "a lock that is never released blocks others until its TTL runs out"]
pub struct CacheLock {
    cache: Arc<dyn PresenceCache>,
    name: String,
    key: String,
}

impl std::fmt::Debug for CacheLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLock").field("key", &self.key).finish()
    }
}

impl CacheLock {
    /// Take the named lock, failing with [`CacheError::LockHeld`] if it is live.
    pub fn acquire(cache: Arc<dyn PresenceCache>, name: &str) -> Result<Self, CacheError> {
        let key = lock_key(name);
        if !cache.set_nx(&key, "1", Some(LOCK_TTL))? {
            warn!(lock = %key, "Lock is held by another process");
            return Err(CacheError::LockHeld(name.to_string()));
        }
        debug!(lock = %key, "Lock acquired");
        Ok(Self {
            cache,
            name: name.to_string(),
            key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lock.
    pub fn release(self) -> Result<(), CacheError> {
        self.cache.delete(&self.key)?;
        debug!(lock = %self.key, "Lock released");
        Ok(())
    }
}
