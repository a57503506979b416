//! Cached view of the pull list.
//!
//! `pull:<id>` entries are point-in-time copies. A full refresh shortens the
//! TTL of every existing copy to a few seconds before paging, so pulls that
//! dropped off the unread list disappear shortly after.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Pull, PullDbError, PullList, PullSource};
use crate::cache::keys::{
    parse_pull_key, pull_key, pull_ttl, PULL_PREFIX, PULL_UNREAD_TTL, REFRESH_GRACE_TTL,
    SEEN_SET, UNREAD_SET,
};
use crate::cache::{PresenceCache, DEFAULT_BATCH_SIZE};

/// Pull list access backed by the presence cache.
pub struct PullCatalog {
    source: Arc<dyn PullSource>,
    cache: Arc<dyn PresenceCache>,
    batch_size: usize,
}

impl PullCatalog {
    pub fn new(source: Arc<dyn PullSource>, cache: Arc<dyn PresenceCache>) -> Self {
        Self {
            source,
            cache,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn cache(&self) -> &Arc<dyn PresenceCache> {
        &self.cache
    }

    /// Re-read every unread pull into the cache.
    ///
    /// Returns the number of pulls cached.
    pub async fn refresh_unread(&self) -> Result<usize, PullDbError> {
        for key in self.cache.keys(PULL_PREFIX)? {
            self.cache.expire(&key, REFRESH_GRACE_TTL)?;
        }
        self.cache.delete(UNREAD_SET)?;

        let mut total = 0;
        let mut cursor: Option<String> = None;
        loop {
            debug!(source = self.source.name(), cursor = ?cursor, "Fetching unread page");
            let page = self
                .source
                .list_page(PullList::Unread, cursor.as_deref())
                .await?;

            let items = page
                .pulls()
                .map(|pull| Ok((pull_key(pull.id), serde_json::to_string(pull)?)))
                .collect::<Result<Vec<_>, PullDbError>>()?;
            self.cache
                .multi_set(&items, self.batch_size, Some(PULL_UNREAD_TTL))?;
            for pull in page.pulls() {
                self.cache.add_member(UNREAD_SET, &pull.id.to_string())?;
            }
            total += items.len();

            if !page.more {
                break;
            }
            match page.position {
                Some(position) => cursor = Some(position),
                None => {
                    warn!("Listing reports more pages but gave no position");
                    break;
                }
            }
        }

        info!(count = total, "Refreshed unread pulls");
        Ok(total)
    }

    /// Page through newly published pulls without caching them.
    pub async fn fetch_new(&self) -> Result<Vec<Pull>, PullDbError> {
        let mut pulls = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            debug!(source = self.source.name(), cursor = ?cursor, "Fetching new page");
            let page = self.source.list_page(PullList::New, cursor.as_deref()).await?;
            let more = page.more;
            let position = page.position.clone();
            pulls.extend(page.into_pulls());

            match (more, position) {
                (true, Some(position)) => cursor = Some(position),
                _ => break,
            }
        }
        Ok(pulls)
    }

    /// Pulls decoded from the cached `pull:*` entries, ordered by id.
    ///
    /// Entries that fail to decode are logged and skipped.
    pub fn list_unread(&self) -> Result<Vec<Pull>, PullDbError> {
        let mut pulls = Vec::new();
        for key in self.cache.keys(PULL_PREFIX)? {
            if parse_pull_key(&key).is_none() {
                continue;
            }
            // May have expired between listing and reading
            let Some(payload) = self.cache.get(&key)? else {
                continue;
            };
            match serde_json::from_str::<Pull>(&payload) {
                Ok(pull) => pulls.push(pull),
                Err(e) => warn!(key = %key, "Skipping undecodable cached pull: {}", e),
            }
        }
        pulls.sort_by_key(|pull| pull.id);
        Ok(pulls)
    }

    /// Unread pulls with no located artifact yet.
    pub fn list_unseen(&self) -> Result<Vec<Pull>, PullDbError> {
        let mut unseen = Vec::new();
        for pull in self.list_unread()? {
            if !self.cache.is_member(SEEN_SET, &pull.id.to_string())? {
                unseen.push(pull);
            }
        }
        Ok(unseen)
    }

    /// Fetch the authoritative state of one pull and cache it.
    ///
    /// Read pulls are cached briefly, unread ones for a day.
    pub async fn refresh_pull(&self, id: u64) -> Result<Pull, PullDbError> {
        let pull = self
            .source
            .get_pull(id)
            .await?
            .ok_or(PullDbError::NotFound(id))?;

        let payload = serde_json::to_string(&pull)?;
        self.cache
            .set(&pull_key(pull.id), &payload, Some(pull_ttl(pull.read)))?;
        Ok(pull)
    }

    /// Move a pull into the user's list. Returns whether the service accepted it.
    pub async fn mark_pulled(&self, id: u64) -> Result<bool, PullDbError> {
        info!(pull_id = id, "Marking pull as pulled");
        let result = self.source.update(&[id]).await?;
        if result.is_updated(id) {
            self.refresh_pull(id).await?;
            Ok(true)
        } else {
            warn!(pull_id = id, failed = ?result.failed, "Unable to pull");
            Ok(false)
        }
    }

    /// Mark pulls as read and drop them from the unread set.
    pub async fn mark_read(&self, ids: &[u64]) -> Result<Vec<u64>, PullDbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.source.mark_read(ids).await?;
        for id in &result.updated {
            self.cache.remove_member(UNREAD_SET, &id.to_string())?;
            self.cache.delete(&pull_key(*id))?;
        }
        if !result.failed.is_empty() {
            warn!(failed = ?result.failed, "Some pulls could not be marked read");
        }
        Ok(result.updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::testing::{ManualClock, MockPullSource};
    use std::time::Duration;

    fn catalog_with(source: MockPullSource) -> (PullCatalog, Arc<MockPullSource>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let source = Arc::new(source);
        (PullCatalog::new(source.clone(), cache), source, clock)
    }

    #[tokio::test]
    async fn test_refresh_unread_pages_and_caches() {
        let source = MockPullSource::new();
        source.set_page_size(2);
        for id in 1..=5 {
            source.add_unread(Pull::new(id, format!("Title {}", id), id as f64));
        }
        let (catalog, source, _clock) = catalog_with(source);

        let count = catalog.refresh_unread().await.unwrap();
        assert_eq!(count, 5);
        assert_eq!(source.list_calls(), 3);

        let ids: Vec<u64> = catalog.list_unread().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(catalog.cache().members(UNREAD_SET).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_refresh_unread_drops_stale_entries_after_grace() {
        let source = MockPullSource::new();
        source.add_unread(Pull::new(1, "Kept 1", 0.1));
        let (catalog, _source, clock) = catalog_with(source);

        let stale = Pull::new(99, "Stale 1", 0.1);
        catalog
            .cache()
            .set(&pull_key(99), &serde_json::to_string(&stale).unwrap(), None)
            .unwrap();

        catalog.refresh_unread().await.unwrap();
        assert_eq!(catalog.list_unread().unwrap().len(), 2);

        clock.advance(Duration::from_secs(6));
        let ids: Vec<u64> = catalog.list_unread().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_list_unseen_excludes_seen() {
        let source = MockPullSource::new();
        source.add_unread(Pull::new(1, "A 1", 0.1));
        source.add_unread(Pull::new(2, "B 1", 0.2));
        let (catalog, _source, _clock) = catalog_with(source);

        catalog.refresh_unread().await.unwrap();
        catalog.cache().add_member(SEEN_SET, "1").unwrap();

        let unseen: Vec<u64> = catalog.list_unseen().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(unseen, vec![2]);
    }

    #[tokio::test]
    async fn test_refresh_pull_uses_read_aware_ttl() {
        let source = MockPullSource::new();
        source.add_unread(Pull::new(1, "Read 1", 0.1).with_read(true));
        source.add_unread(Pull::new(2, "Unread 1", 0.2));
        let (catalog, _source, clock) = catalog_with(source);

        assert!(catalog.refresh_pull(1).await.unwrap().read);
        assert!(!catalog.refresh_pull(2).await.unwrap().read);

        clock.advance(Duration::from_secs(31));
        assert!(catalog.cache().get(&pull_key(1)).unwrap().is_none());
        assert!(catalog.cache().get(&pull_key(2)).unwrap().is_some());

        assert!(matches!(
            catalog.refresh_pull(3).await,
            Err(PullDbError::NotFound(3))
        ));
    }

    #[tokio::test]
    async fn test_fetch_new_does_not_cache() {
        let source = MockPullSource::new();
        source.set_page_size(1);
        let mut fresh = Pull::new(10, "Fresh 1", 0.1);
        fresh.pulled = false;
        source.add_new(fresh.clone());
        source.add_new(Pull::new(11, "Fresh 2", 0.1));
        let (catalog, _source, _clock) = catalog_with(source);

        let pulls = catalog.fetch_new().await.unwrap();
        assert_eq!(pulls.len(), 2);
        assert_eq!(pulls[0], fresh);
        assert!(catalog.list_unread().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_pulled_refreshes_on_success() {
        let source = MockPullSource::new();
        let mut fresh = Pull::new(10, "Fresh 1", 0.1);
        fresh.pulled = false;
        source.add_new(fresh);
        let (catalog, source, _clock) = catalog_with(source);

        assert!(catalog.mark_pulled(10).await.unwrap());
        assert!(source.pulled_ids().contains(&10));
        let cached = catalog.list_unread().unwrap();
        assert_eq!(cached.len(), 1);
        assert!(cached[0].pulled);

        assert!(!catalog.mark_pulled(404).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_read_updates_cache() {
        let source = MockPullSource::new();
        source.add_unread(Pull::new(1, "A 1", 0.1));
        source.add_unread(Pull::new(2, "B 1", 0.2));
        let (catalog, source, _clock) = catalog_with(source);
        catalog.refresh_unread().await.unwrap();

        let updated = catalog.mark_read(&[1]).await.unwrap();
        assert_eq!(updated, vec![1]);
        assert_eq!(source.read_ids(), vec![1]);
        let ids: Vec<u64> = catalog.list_unread().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2]);

        assert!(catalog.mark_read(&[]).await.unwrap().is_empty());
    }
}
