//! Sync lifecycle integration tests.
//!
//! These tests run whole syncs against a mock pull service and a mock
//! object store, with a real SQLite cache and a temporary mirror directory:
//! - Stream stalls and weight ordering
//! - Skipping files already mirrored
//! - Expiry in unread and strict modes
//! - Download failures

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use pullsync_core::{
    cache::keys::SEEN_SET,
    testing::{
        archive_descriptor, fixtures::streamed_pull, MockObjectStore, MockPullSource,
        RecordingSleeper,
    },
    ExpiryMode, PresenceCache, Pull, PullCatalog, RemoteLocator, RetryPolicy, SqliteCache,
    SyncOptions, SyncRunner,
};

/// Test helper wiring a sync runner to mocks.
struct TestHarness {
    runner: SyncRunner,
    catalog: Arc<PullCatalog>,
    source: Arc<MockPullSource>,
    store: Arc<MockObjectStore>,
    cache: Arc<SqliteCache>,
    mirror: TempDir,
    _db_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let db_dir = TempDir::new().expect("Failed to create temp dir");
        let mirror = TempDir::new().expect("Failed to create mirror dir");

        let cache = Arc::new(
            SqliteCache::new(&db_dir.path().join("cache.db")).expect("Failed to create cache"),
        );
        let source = Arc::new(MockPullSource::new());
        let store = Arc::new(MockObjectStore::new());

        let catalog = Arc::new(PullCatalog::new(source.clone(), cache.clone()));
        let locator = Arc::new(RemoteLocator::new(
            cache.clone(),
            store.clone(),
            Arc::new(RecordingSleeper::new()),
            RetryPolicy::new(Duration::from_millis(100), 5),
            "long-box",
        ));
        let runner = SyncRunner::new(catalog.clone(), locator);

        Self {
            runner,
            catalog,
            source,
            store,
            cache,
            mirror,
            _db_dir: db_dir,
        }
    }

    /// Register an unread pull, with a remote archive when `file` is given.
    fn add(&self, pull: Pull, file: Option<&str>) {
        if let Some(file) = file {
            self.store.put("long-box", archive_descriptor(pull.id, file));
        }
        self.source.add_unread(pull);
    }

    fn touch(&self, name: &str) {
        std::fs::write(self.mirror.path().join(name), b"old").expect("Failed to write file");
    }

    fn mirrored(&self, name: &str) -> bool {
        self.mirror.path().join(name).exists()
    }

    fn options(&self, mode: ExpiryMode) -> SyncOptions {
        let mut options = SyncOptions::new(self.mirror.path());
        options.count = 10;
        options.mode = mode;
        options
    }

    /// A stalled stream, an independent pull already mirrored and one to fetch.
    fn seed_standard(&self) {
        self.add(streamed_pull(1, "Saga 1", 0.1, "saga"), Some("Saga 1.cbz"));
        self.add(streamed_pull(2, "Saga 2", 0.3, "saga"), None);
        self.add(streamed_pull(3, "Saga 3", 0.5, "saga"), Some("Saga 3.cbr"));
        self.add(Pull::new(4, "Paper Girls 1", 0.2), Some("Paper Girls 1.cbz"));
        self.add(Pull::new(5, "Monstress 1", 0.4), Some("Monstress 1.cbr"));
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_sync_stalls_stream_and_mirrors_the_rest() {
    let harness = TestHarness::new();
    harness.seed_standard();
    harness.touch("Paper Girls 1 [000004].cbz");
    harness.catalog.refresh_unread().await.unwrap();

    let report = harness
        .runner
        .run(&harness.options(ExpiryMode::Unread))
        .await
        .unwrap();

    assert_eq!(report.admitted, vec![1, 4, 5]);
    assert_eq!(report.present, vec![4]);
    assert!(report.failed.is_empty());
    assert!(report.expired.is_empty());
    assert_eq!(report.fetched.len(), 2);

    assert_eq!(
        file_names(harness.mirror.path()),
        vec![
            "Monstress 1 [000005].cbr",
            "Paper Girls 1 [000004].cbz",
            "Saga 1 [000001].cbz",
        ]
    );
    // The pre-existing file is left alone.
    assert_eq!(
        std::fs::read(harness.mirror.path().join("Paper Girls 1 [000004].cbz")).unwrap(),
        b"old"
    );
    assert_eq!(harness.store.download_calls(), 2);

    assert!(harness.cache.is_member(SEEN_SET, "1").unwrap());
    assert!(!harness.cache.is_member(SEEN_SET, "2").unwrap());
    assert!(!harness.cache.is_member(SEEN_SET, "3").unwrap());
}

#[tokio::test]
async fn test_unread_mode_expires_only_pulls_no_longer_unread() {
    let harness = TestHarness::new();
    harness.seed_standard();
    harness.touch("Saga 3 [000003].cbr");
    harness.touch("Finished 1 [000009].cbz");
    harness.touch("notes.txt");
    harness.catalog.refresh_unread().await.unwrap();

    let report = harness
        .runner
        .run(&harness.options(ExpiryMode::Unread))
        .await
        .unwrap();

    assert_eq!(
        report.expired,
        vec![harness.mirror.path().join("Finished 1 [000009].cbz")]
    );
    assert!(harness.mirrored("Saga 3 [000003].cbr"));
    assert!(harness.mirrored("notes.txt"));
    assert!(!harness.mirrored("Finished 1 [000009].cbz"));
}

#[tokio::test]
async fn test_strict_mode_expires_everything_not_admitted() {
    let harness = TestHarness::new();
    harness.seed_standard();
    harness.touch("Saga 3 [000003].cbr");
    harness.touch("Paper Girls 1 [000004].cbz");
    harness.catalog.refresh_unread().await.unwrap();

    let report = harness
        .runner
        .run(&harness.options(ExpiryMode::Strict))
        .await
        .unwrap();

    assert_eq!(
        report.expired,
        vec![harness.mirror.path().join("Saga 3 [000003].cbr")]
    );
    assert!(harness.mirrored("Paper Girls 1 [000004].cbz"));
    assert!(!harness.mirrored("Saga 3 [000003].cbr"));
}

#[tokio::test]
async fn test_count_limits_admissions() {
    let harness = TestHarness::new();
    harness.seed_standard();
    harness.catalog.refresh_unread().await.unwrap();

    let mut options = harness.options(ExpiryMode::Unread);
    options.count = 2;
    let report = harness.runner.run(&options).await.unwrap();

    assert_eq!(report.admitted, vec![1, 4]);
    assert_eq!(report.fetched.len(), 2);
    assert!(!harness.mirrored("Monstress 1 [000005].cbr"));
}

#[tokio::test]
async fn test_failed_download_is_reported_and_run_continues() {
    let harness = TestHarness::new();
    harness.add(Pull::new(1, "Saga 1", 0.1), Some("Saga 1.cbz"));
    harness.add(Pull::new(2, "Saga 2", 0.2), Some("Saga 2.cbz"));
    harness.catalog.refresh_unread().await.unwrap();

    // Every attempt for the first pull fails, retries included.
    harness.store.fail_next_downloads(6);
    let report = harness
        .runner
        .run(&harness.options(ExpiryMode::Unread))
        .await
        .unwrap();

    assert_eq!(report.admitted, vec![1, 2]);
    assert_eq!(report.failed, vec![1]);
    assert_eq!(
        report.fetched,
        vec![harness.mirror.path().join("Saga 2 [000002].cbz")]
    );
    assert_eq!(harness.store.download_calls(), 7);
    assert!(!harness.mirrored("Saga 1 [000001].cbz"));
}

#[tokio::test]
async fn test_read_pulls_are_skipped() {
    let harness = TestHarness::new();
    harness.add(Pull::new(1, "Saga 1", 0.1), Some("Saga 1.cbz"));
    harness.add(Pull::new(2, "Saga 2", 0.2).with_read(true), Some("Saga 2.cbz"));
    harness.catalog.refresh_unread().await.unwrap();

    let report = harness
        .runner
        .run(&harness.options(ExpiryMode::Unread))
        .await
        .unwrap();

    assert_eq!(report.admitted, vec![1]);
    assert_eq!(harness.source.list_calls(), 1);
}
