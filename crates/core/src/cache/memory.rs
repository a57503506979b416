//! In-memory presence cache, for tests and dry runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{expiry_millis, CacheError, PresenceCache};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Entry>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// Presence cache held entirely in process memory.
pub struct MemoryCache {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache that evaluates TTLs against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, CacheError> {
        self.state.lock().map_err(|_| CacheError::Poisoned)
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn is_live(entry: &Entry, now: i64) -> bool {
        entry.expires_at.is_none_or(|at| at > now)
    }
}

impl PresenceCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.now_millis();
        let mut state = self.lock()?;
        match state.values.get(key) {
            Some(entry) if Self::is_live(entry, now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                state.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expires_at = expiry_millis(self.clock.now(), ttl);
        self.lock()?.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        if let Some(entry) = state.values.get(key) {
            if Self::is_live(entry, now.timestamp_millis()) {
                return Ok(false);
            }
        }
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: expiry_millis(now, ttl),
            },
        );
        Ok(true)
    }

    fn multi_set(
        &self,
        items: &[(String, String)],
        batch_size: usize,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let expires_at = expiry_millis(self.clock.now(), ttl);
        for batch in items.chunks(batch_size.max(1)) {
            let mut state = self.lock()?;
            for (key, value) in batch {
                state.values.insert(
                    key.clone(),
                    Entry {
                        value: value.clone(),
                        expires_at,
                    },
                );
            }
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut state = self.lock()?;
        let removed_value = state.values.remove(key).is_some();
        let removed_set = state.sets.remove(key).is_some();
        Ok(removed_value || removed_set)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        match state.values.get_mut(key) {
            Some(entry) if Self::is_live(entry, now.timestamp_millis()) => {
                entry.expires_at = expiry_millis(now, Some(ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = self.now_millis();
        let state = self.lock()?;
        let mut keys: Vec<String> = state
            .values
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && Self::is_live(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn is_member(&self, set_key: &str, member: &str) -> Result<bool, CacheError> {
        Ok(self
            .lock()?
            .sets
            .get(set_key)
            .is_some_and(|set| set.contains(member)))
    }

    fn add_member(&self, set_key: &str, member: &str) -> Result<bool, CacheError> {
        Ok(self
            .lock()?
            .sets
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    fn remove_member(&self, set_key: &str, member: &str) -> Result<bool, CacheError> {
        let mut state = self.lock()?;
        let removed = state
            .sets
            .get_mut(set_key)
            .is_some_and(|set| set.remove(member));
        if state.sets.get(set_key).is_some_and(|set| set.is_empty()) {
            state.sets.remove(set_key);
        }
        Ok(removed)
    }

    fn members(&self, set_key: &str) -> Result<Vec<String>, CacheError> {
        Ok(self
            .lock()?
            .sets
            .get(set_key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}
