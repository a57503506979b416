//! Finds the remote artifact for a pull.
//!
//! Each pull's files live under a prefix derived from its id. The presence
//! cache remembers which ids have been found (`gs:seen`) together with their
//! descriptor list (`gs:file:<id>`), so the object store is only listed for
//! ids that have not been located yet or whose descriptor list expired.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::keys::{file_key, FILE_TTL, SEEN_SET};
use crate::cache::{CacheError, PresenceCache};
use crate::metrics;
use crate::pulldb::Pull;
use crate::retry::{RetryPolicy, Sleeper};
use crate::storage::{ArchiveFormat, ObjectStore, RemoteFileDescriptor, StorageError};

/// Default first segment of every item prefix.
pub const DEFAULT_PREFIX_ROOT: &str = "comics";

#[derive(Debug, Error)]
pub enum LocateError {
    /// The object store failed permanently or retries ran out.
    #[error("Object store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// None of the located files is a recognized archive.
    #[error("No supported archive for {object}: content type {content_type:?}")]
    UnsupportedFileType {
        object: String,
        content_type: String,
    },
}

/// Object prefix for an id: `{root}/{low byte}/{second byte}/{id}` in hex.
pub fn storage_prefix(root: &str, id: u64) -> String {
    format!(
        "{}/{:02x}/{:02x}/{:x}",
        root,
        id & 0xff,
        (id >> 8) & 0xff,
        id
    )
}

/// Pick the archive to mirror from a descriptor list.
///
/// The last descriptor with a recognized archive content type wins.
pub fn select_archive(
    descriptors: &[RemoteFileDescriptor],
) -> Result<(&RemoteFileDescriptor, ArchiveFormat), LocateError> {
    descriptors
        .iter()
        .rev()
        .find_map(|d| d.archive_format().map(|format| (d, format)))
        .ok_or_else(|| {
            let last = descriptors.last();
            LocateError::UnsupportedFileType {
                object: last.map(|d| d.object_name.clone()).unwrap_or_default(),
                content_type: last.map(|d| d.content_type.clone()).unwrap_or_default(),
            }
        })
}

/// Locates remote artifacts, consulting the presence cache first.
pub struct RemoteLocator {
    cache: Arc<dyn PresenceCache>,
    store: Arc<dyn ObjectStore>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    bucket: String,
    prefix_root: String,
}

impl RemoteLocator {
    pub fn new(
        cache: Arc<dyn PresenceCache>,
        store: Arc<dyn ObjectStore>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            store,
            sleeper,
            policy,
            bucket: bucket.into(),
            prefix_root: DEFAULT_PREFIX_ROOT.to_string(),
        }
    }

    pub fn with_prefix_root(mut self, prefix_root: impl Into<String>) -> Self {
        self.prefix_root = prefix_root.into();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix_for(&self, id: u64) -> String {
        storage_prefix(&self.prefix_root, id)
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Descriptor list for an id from the cache.
    ///
    /// A `gs:seen` membership whose payload has expired is dropped, and the
    /// id counts as not located.
    fn cached(&self, id: u64) -> Result<Option<Vec<RemoteFileDescriptor>>, LocateError> {
        let member = id.to_string();
        if !self.cache.is_member(SEEN_SET, &member)? {
            return Ok(None);
        }

        let key = file_key(id);
        let Some(payload) = self.cache.get(&key)? else {
            debug!(pull_id = id, "Seen marker without file detail, clearing");
            metrics::CACHE_LOOKUPS.with_label_values(&["dangling"]).inc();
            self.cache.remove_member(SEEN_SET, &member)?;
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(descriptors) => {
                metrics::CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                Ok(Some(descriptors))
            }
            Err(e) => {
                warn!(key = %key, "Discarding undecodable file detail: {}", e);
                self.cache.delete(&key)?;
                self.cache.remove_member(SEEN_SET, &member)?;
                Ok(None)
            }
        }
    }

    /// Locate the artifact for a pull id.
    ///
    /// `Ok(None)` means nothing exists under the id's prefix. Empty listings
    /// are not cached, so the next call asks the store again.
    pub async fn locate(&self, id: u64) -> Result<Option<Vec<RemoteFileDescriptor>>, LocateError> {
        if let Some(descriptors) = self.cached(id)? {
            return Ok(Some(descriptors));
        }
        metrics::CACHE_LOOKUPS.with_label_values(&["miss"]).inc();

        let prefix = self.prefix_for(id);
        let listing = self
            .policy
            .run(self.sleeper.as_ref(), "list", || {
                self.store.list(&self.bucket, &prefix)
            })
            .await;

        let descriptors = match listing {
            Ok(descriptors) => descriptors,
            Err(e) => {
                metrics::REMOTE_LOOKUPS.with_label_values(&["error"]).inc();
                return Err(e.into());
            }
        };

        if descriptors.is_empty() {
            debug!(pull_id = id, prefix = %prefix, "No files found");
            metrics::REMOTE_LOOKUPS.with_label_values(&["not_found"]).inc();
            return Ok(None);
        }

        debug!(pull_id = id, prefix = %prefix, count = descriptors.len(), "Files found");
        metrics::REMOTE_LOOKUPS.with_label_values(&["found"]).inc();
        let payload = serde_json::to_string(&descriptors).map_err(CacheError::from)?;
        self.cache.set(&file_key(id), &payload, Some(FILE_TTL))?;
        self.cache.add_member(SEEN_SET, &id.to_string())?;

        Ok(Some(descriptors))
    }

    /// Locate each pull in turn, returning the ones found.
    ///
    /// A failed lookup is logged and the pull left out.
    pub async fn locate_all(&self, pulls: &[Pull]) -> Vec<(u64, Vec<RemoteFileDescriptor>)> {
        let mut found = Vec::new();
        for pull in pulls {
            match self.locate(pull.id).await {
                Ok(Some(descriptors)) => {
                    debug!(pull_id = pull.id, "File found for {}", pull.display_name());
                    found.push((pull.id, descriptors));
                }
                Ok(None) => debug!(pull_id = pull.id, "No file for {}", pull.display_name()),
                Err(e) => warn!(pull_id = pull.id, "Unable to locate {}: {}", pull.display_name(), e),
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::testing::{archive_descriptor, MockObjectStore, RecordingSleeper};
    use std::time::Duration;

    struct Fixture {
        locator: RemoteLocator,
        cache: Arc<MemoryCache>,
        store: Arc<MockObjectStore>,
        sleeper: Arc<RecordingSleeper>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(MemoryCache::new());
        let store = Arc::new(MockObjectStore::new());
        let sleeper = Arc::new(RecordingSleeper::new());
        let locator = RemoteLocator::new(
            cache.clone(),
            store.clone(),
            sleeper.clone(),
            RetryPolicy::new(Duration::from_millis(100), 5),
            "long-box",
        );
        Fixture {
            locator,
            cache,
            store,
            sleeper,
        }
    }

    #[test]
    fn test_storage_prefix() {
        assert_eq!(storage_prefix("comics", 0x1234), "comics/34/12/1234");
        assert_eq!(storage_prefix("comics", 1000), "comics/e8/03/3e8");
        assert_eq!(storage_prefix("comics", 0x0a), "comics/0a/00/a");
        assert_eq!(storage_prefix("comics", 0x123456), "comics/56/34/123456");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let f = fixture();
        f.store.put("long-box", archive_descriptor(1000, "Test Issue 1.cbz"));

        let first = f.locator.locate(1000).await.unwrap().unwrap();
        let second = f.locator.locate(1000).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(f.store.list_calls(), 1);
        assert!(f.cache.is_member(SEEN_SET, "1000").unwrap());
    }

    #[tokio::test]
    async fn test_dangling_seen_marker_requeries_once() {
        let f = fixture();
        f.store.put("long-box", archive_descriptor(7, "Seven 1.cbr"));
        f.cache.add_member(SEEN_SET, "7").unwrap();

        let found = f.locator.locate(7).await.unwrap().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(f.store.list_calls(), 1);

        f.locator.locate(7).await.unwrap();
        assert_eq!(f.store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let f = fixture();

        assert!(f.locator.locate(42).await.unwrap().is_none());
        assert!(f.locator.locate(42).await.unwrap().is_none());
        assert_eq!(f.store.list_calls(), 2);
        assert!(!f.cache.is_member(SEEN_SET, "42").unwrap());
        assert!(f.cache.get(&file_key(42)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let f = fixture();
        f.store.put("long-box", archive_descriptor(5, "Five 1.cbz"));
        f.store.fail_next_lists(4);

        let found = f.locator.locate(5).await.unwrap();
        assert!(found.is_some());
        assert_eq!(f.store.list_calls(), 5);
        assert_eq!(f.sleeper.sleeps().len(), 4);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_storage_error() {
        let f = fixture();
        f.store.fail_next_lists(6);

        let result = f.locator.locate(5).await;
        assert!(matches!(result, Err(LocateError::Storage(_))));
        assert_eq!(f.store.list_calls(), 6);
        assert!(!f.cache.is_member(SEEN_SET, "5").unwrap());
    }

    #[tokio::test]
    async fn test_locate_all_skips_missing() {
        let f = fixture();
        f.store.put("long-box", archive_descriptor(2, "Two 1.cbz"));
        let pulls = vec![Pull::new(1, "One 1", 0.1), Pull::new(2, "Two 1", 0.2)];

        let found = f.locator.locate_all(&pulls).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 2);
        assert_eq!(found[0].1[0].file_name(), "Two 1.cbz");
    }

    #[test]
    fn test_select_archive_picks_last_recognized() {
        let mut notes = archive_descriptor(1, "notes.txt");
        notes.content_type = "text/plain".to_string();
        let cbr = archive_descriptor(1, "Issue 1.cbr");
        let cbz = archive_descriptor(1, "Issue 1.cbz");

        let descriptors = vec![cbr, cbz.clone(), notes.clone()];
        let (chosen, format) = select_archive(&descriptors).unwrap();
        assert_eq!(chosen, &cbz);
        assert_eq!(format, ArchiveFormat::Cbz);

        let result = select_archive(std::slice::from_ref(&notes));
        assert!(matches!(
            result,
            Err(LocateError::UnsupportedFileType { content_type, .. }) if content_type == "text/plain"
        ));
    }
}
