//! Mirror admitted pulls into a local directory.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use super::{SyncError, SyncOptions, SyncReport};
use crate::cache::{CacheLock, PresenceCache};
use crate::locator::{select_archive, RemoteLocator};
use crate::metrics;
use crate::pulldb::{Pull, PullCatalog};
use crate::scheduler::{expire_files, expired_ids, identify_local, SyncScheduler};
use crate::storage::RemoteFileDescriptor;

/// Name of the lock held while expiring local files.
pub const SYNC_LOCK: &str = "sync";

/// Make a pull name usable as a filename.
pub fn safe_name(name: &str) -> String {
    name.replace('/', "-")
}

/// Local filename for a pull: `"{safe name} [{hex id}].{ext}"`.
pub fn destination_name(pull: &Pull, extension: &str) -> String {
    format!(
        "{} [{}].{}",
        safe_name(&pull.display_name()),
        pull.hex_id(),
        extension
    )
}

/// Runs one sync of the local mirror.
pub struct SyncRunner {
    catalog: Arc<PullCatalog>,
    locator: Arc<RemoteLocator>,
    scheduler: SyncScheduler,
}

impl SyncRunner {
    pub fn new(catalog: Arc<PullCatalog>, locator: Arc<RemoteLocator>) -> Self {
        let scheduler = SyncScheduler::new(catalog.clone(), locator.clone());
        Self {
            catalog,
            locator,
            scheduler,
        }
    }

    fn cache(&self) -> Arc<dyn PresenceCache> {
        self.catalog.cache().clone()
    }

    /// Fetch up to `options.count` pulls, then expire local files.
    pub async fn run(&self, options: &SyncOptions) -> Result<SyncReport, SyncError> {
        let destination = options.destination.as_path();
        let local = identify_local(destination)
            .await
            .map_err(|e| SyncError::io(destination, e))?;
        let existing: BTreeSet<u64> = local.iter().map(|file| file.id).collect();
        debug!(existing = ?existing, "Existing issues");

        let mut report = SyncReport::default();
        let mut admitted = HashSet::new();

        let pulls = self.catalog.list_unread()?;
        let mut plan = self.scheduler.plan(pulls, options.count);
        while let Some(pull) = plan.next().await {
            admitted.insert(pull.id);
            report.admitted.push(pull.id);
            info!(
                "{:06} {}",
                (pull.weight * 1e6) as i64,
                pull.display_name()
            );
            self.fetch(&pull, destination, &existing, &mut report).await;
        }

        let lock = CacheLock::acquire(self.cache(), SYNC_LOCK)?;
        let expired = expired_ids(&existing, &admitted, options.mode, self.cache().as_ref());
        let expired = match expired {
            Ok(expired) => expired,
            Err(e) => {
                lock.release()?;
                return Err(e.into());
            }
        };
        debug!(existing = ?existing, admitted = ?admitted, expired = ?expired, "Expiry set");
        report.expired = expire_files(&local, &expired).await;
        lock.release()?;

        info!(
            admitted = report.admitted.len(),
            fetched = report.fetched.len(),
            present = report.present.len(),
            failed = report.failed.len(),
            expired = report.expired.len(),
            "Sync complete"
        );
        Ok(report)
    }

    /// Download one admitted pull unless it is already mirrored.
    ///
    /// Failures are logged and recorded in the report.
    async fn fetch(
        &self,
        pull: &Pull,
        destination: &Path,
        existing: &BTreeSet<u64>,
        report: &mut SyncReport,
    ) {
        let descriptors = match self.locator.locate(pull.id).await {
            Ok(Some(descriptors)) => descriptors,
            Ok(None) => {
                warn!(pull_id = pull.id, "Could not find file details, skipping");
                report.failed.push(pull.id);
                metrics::FILES_FETCHED.with_label_values(&["failed"]).inc();
                return;
            }
            Err(e) => {
                warn!(pull_id = pull.id, "Could not locate files, skipping: {}", e);
                report.failed.push(pull.id);
                metrics::FILES_FETCHED.with_label_values(&["failed"]).inc();
                return;
            }
        };

        let (source, format) = match select_archive(&descriptors) {
            Ok(selected) => selected,
            Err(e) => {
                warn!(pull_id = pull.id, "{}", e);
                report.failed.push(pull.id);
                metrics::FILES_FETCHED.with_label_values(&["failed"]).inc();
                return;
            }
        };

        if existing.contains(&pull.id) {
            info!(
                "Skipping file {}. Already present in destination.",
                source.object_name
            );
            report.present.push(pull.id);
            metrics::FILES_FETCHED.with_label_values(&["present"]).inc();
            return;
        }

        let path = destination.join(destination_name(pull, format.extension()));
        info!("Fetching {} -> {}", source.object_name, path.display());
        match self.download(source, &path).await {
            Ok(bytes) => {
                debug!(pull_id = pull.id, bytes, "Download complete");
                report.fetched.push(path);
                metrics::FILES_FETCHED.with_label_values(&["fetched"]).inc();
            }
            Err(e) => {
                warn!(pull_id = pull.id, "Error downloading file: {}", e);
                report.failed.push(pull.id);
                metrics::FILES_FETCHED.with_label_values(&["failed"]).inc();
            }
        }
    }

    async fn download(
        &self,
        source: &RemoteFileDescriptor,
        path: &Path,
    ) -> Result<u64, crate::storage::StorageError> {
        let store = self.locator.store();
        self.locator
            .policy()
            .run(self.locator.sleeper(), "download", || store.download(source, path))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("Batman/Superman 12"), "Batman-Superman 12");
        assert_eq!(safe_name("Saga 43"), "Saga 43");
    }

    #[test]
    fn test_destination_name() {
        let pull = Pull::new(1000, "Batman/Superman 12", 0.1);
        assert_eq!(
            destination_name(&pull, "cbz"),
            "Batman-Superman 12 [0003e8].cbz"
        );
    }
}
