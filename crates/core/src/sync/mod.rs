//! The sync run: admit pulls, mirror their archives, expire old files.

mod runner;

pub use runner::{destination_name, safe_name, SyncRunner, SYNC_LOCK};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::SyncConfig;
use crate::pulldb::PullDbError;
use crate::scheduler::ExpiryMode;

/// Default number of pulls admitted per run.
pub const DEFAULT_SYNC_COUNT: usize = 25;

/// Errors that abort a whole sync run.
///
/// Problems with a single pull are logged and recorded in the
/// [`SyncReport`] instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Pull list error: {0}")]
    PullDb(#[from] PullDbError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Parameters of one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub destination: PathBuf,
    /// Maximum number of pulls admitted.
    pub count: usize,
    pub mode: ExpiryMode,
}

impl SyncOptions {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            count: DEFAULT_SYNC_COUNT,
            mode: ExpiryMode::Unread,
        }
    }

    /// Options from configuration, or `None` without a destination.
    pub fn from_config(config: &SyncConfig) -> Option<Self> {
        let destination = config.destination.clone()?;
        Some(Self {
            destination,
            count: config.count,
            mode: ExpiryMode::from_strict(config.strict),
        })
    }
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Pull ids admitted by the scheduler, in order.
    pub admitted: Vec<u64>,
    /// Files downloaded this run.
    pub fetched: Vec<PathBuf>,
    /// Admitted pulls already present locally.
    pub present: Vec<u64>,
    /// Admitted pulls that could not be mirrored.
    pub failed: Vec<u64>,
    /// Local files removed by expiry.
    pub expired: Vec<PathBuf>,
}
