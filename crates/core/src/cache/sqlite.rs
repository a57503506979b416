//! SQLite-backed presence cache implementation.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::{expiry_millis, CacheError, PresenceCache};
use crate::clock::{Clock, SystemClock};

/// SQLite-backed presence cache.
///
/// Values carry an absolute expiry in milliseconds; expired rows are ignored
/// by every read and removed opportunistically.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`.
    pub fn new(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, Arc::new(SystemClock))
    }

    /// Create an in-memory SQLite cache (useful for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?, Arc::new(SystemClock))
    }

    /// Create an in-memory cache that evaluates TTLs against `clock`.
    pub fn in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?, clock)
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries(expires_at);

            CREATE TABLE IF NOT EXISTS cache_set_members (
                set_key TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (set_key, member)
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    /// Remove every expired value. Returns the number of rows removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.now_millis();
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?",
            params![now],
        )?;
        Ok(removed)
    }
}

impl PresenceCache for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.now_millis();
        let conn = self.lock()?;
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM cache_entries WHERE key = ?",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((value, expires_at)) if expires_at.is_none_or(|at| at > now) => Ok(Some(value)),
            Some(_) => {
                conn.execute("DELETE FROM cache_entries WHERE key = ?", params![key])?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expires_at = expiry_millis(self.clock.now(), ttl);
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM cache_entries WHERE key = ? AND expires_at IS NOT NULL AND expires_at <= ?",
            params![key, now.timestamp_millis()],
        )?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)",
            params![key, value, expiry_millis(now, ttl)],
        )?;
        Ok(inserted == 1)
    }

    fn multi_set(
        &self,
        items: &[(String, String)],
        batch_size: usize,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let expires_at = expiry_millis(self.clock.now(), ttl);
        let mut conn = self.lock()?;
        for batch in items.chunks(batch_size.max(1)) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)",
                )?;
                for (key, value) in batch {
                    stmt.execute(params![key, value, expires_at])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let conn = self.lock()?;
        let values = conn.execute("DELETE FROM cache_entries WHERE key = ?", params![key])?;
        let members = conn.execute(
            "DELETE FROM cache_set_members WHERE set_key = ?",
            params![key],
        )?;
        Ok(values + members > 0)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE cache_entries SET expires_at = ?
             WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
            params![expiry_millis(now, Some(ttl)), key, now.timestamp_millis()],
        )?;
        Ok(updated > 0)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = self.now_millis();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key FROM cache_entries
             WHERE substr(key, 1, length(?1)) = ?1
               AND (expires_at IS NULL OR expires_at > ?2)
             ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix, now], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn is_member(&self, set_key: &str, member: &str) -> Result<bool, CacheError> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM cache_set_members WHERE set_key = ? AND member = ?",
                params![set_key, member],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn add_member(&self, set_key: &str, member: &str) -> Result<bool, CacheError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO cache_set_members (set_key, member) VALUES (?, ?)",
            params![set_key, member],
        )?;
        Ok(inserted == 1)
    }

    fn remove_member(&self, set_key: &str, member: &str) -> Result<bool, CacheError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM cache_set_members WHERE set_key = ? AND member = ?",
            params![set_key, member],
        )?;
        Ok(removed > 0)
    }

    fn members(&self, set_key: &str) -> Result<Vec<String>, CacheError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT member FROM cache_set_members WHERE set_key = ? ORDER BY member",
        )?;
        let members = stmt
            .query_map(params![set_key], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(members)
    }
}
