pub mod cache;
pub mod clock;
pub mod config;
pub mod locator;
pub mod matcher;
pub mod metrics;
pub mod normalize;
pub mod pulldb;
pub mod retry;
pub mod scheduler;
pub mod storage;
pub mod sync;
pub mod testing;
pub mod todo;
pub mod toread;
pub mod upload;

pub use cache::{CacheError, CacheLock, MemoryCache, PresenceCache, SqliteCache};
pub use clock::{Clock, SystemClock};
pub use config::{
    load_config, load_config_from_str, validate_config, CacheBackend, Config, ConfigError,
    SanitizedConfig,
};
pub use locator::{select_archive, storage_prefix, LocateError, RemoteLocator};
pub use matcher::{MatchResult, Matcher};
pub use normalize::{normalize, NameNormalizer, NormalizedName, RewriteTable};
pub use pulldb::{HttpPullSource, Pull, PullCatalog, PullDbError, PullSource};
pub use retry::{RetryPolicy, Retryable, Sleeper, TokioSleeper};
pub use scheduler::{ExpiryMode, SyncScheduler};
pub use storage::{
    ArchiveFormat, GcsObjectStore, ObjectStore, RemoteFileDescriptor, StorageError,
};
pub use sync::{SyncError, SyncOptions, SyncReport, SyncRunner};
pub use todo::{TodoError, TodoRunner};
pub use upload::{CandidateSource, UploadError, UploadOptions, UploadRunner};
