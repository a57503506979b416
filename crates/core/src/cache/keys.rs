//! Cache key namespace and TTL policy.
//!
//! These keys are shared with any other tool reading the same cache and must
//! stay byte-for-byte stable.

use std::time::Duration;

/// Prefix of cached pull metadata keys.
pub const PULL_PREFIX: &str = "pull:";
/// Prefix of cached descriptor list keys.
pub const FILE_PREFIX: &str = "gs:file:";
/// Set of pull ids whose remote artifact has been located.
pub const SEEN_SET: &str = "gs:seen";
/// Working set of unread pull ids, rebuilt on every refresh.
pub const UNREAD_SET: &str = "pulls:unread";
/// Prefix of lock keys.
pub const LOCK_PREFIX: &str = "lock:";

/// Unread pulls change rarely.
pub const PULL_UNREAD_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Read pulls should drop out of the unread view quickly.
pub const PULL_READ_TTL: Duration = Duration::from_secs(30);
/// Remote layout is stable once uploaded.
pub const FILE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Bounds how long a crashed lock holder blocks others.
pub const LOCK_TTL: Duration = Duration::from_secs(30);
/// Grace period given to existing pull keys when a refresh starts.
pub const REFRESH_GRACE_TTL: Duration = Duration::from_secs(5);

pub fn pull_key(id: u64) -> String {
    format!("{}{}", PULL_PREFIX, id)
}

pub fn file_key(id: u64) -> String {
    format!("{}{}", FILE_PREFIX, id)
}

pub fn lock_key(name: &str) -> String {
    format!("{}{}", LOCK_PREFIX, name)
}

/// TTL for a cached pull, depending on its read flag.
pub fn pull_ttl(read: bool) -> Duration {
    if read {
        PULL_READ_TTL
    } else {
        PULL_UNREAD_TTL
    }
}

/// Parse the id out of a `pull:<id>` key.
pub fn parse_pull_key(key: &str) -> Option<u64> {
    key.strip_prefix(PULL_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(pull_key(1000), "pull:1000");
        assert_eq!(file_key(1000), "gs:file:1000");
        assert_eq!(lock_key("todo"), "lock:todo");
        assert_eq!(parse_pull_key("pull:1000"), Some(1000));
        assert_eq!(parse_pull_key("gs:file:1000"), None);
        assert_eq!(parse_pull_key("pull:abc"), None);
    }

    #[test]
    fn test_pull_ttl_depends_on_read_flag() {
        assert_eq!(pull_ttl(false), Duration::from_secs(86_400));
        assert_eq!(pull_ttl(true), Duration::from_secs(30));
    }
}
