//! Match local archives against pulls and upload the good matches.
//!
//! A scan walks a directory for `.cbr`/`.cbz` files and scores each against
//! the candidate pulls. Only matches with the same issue number and a
//! weighted distance under the threshold are acted on, and only when the run
//! commits; otherwise the scan just reports what it would do.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::locator::RemoteLocator;
use crate::matcher::{MatchResult, Matcher};
use crate::metrics;
use crate::pulldb::{Pull, PullCatalog, PullDbError};
use crate::storage::ArchiveFormat;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pull list error: {0}")]
    PullDb(#[from] PullDbError),
}

/// Which pulls scanned files are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidateSource {
    /// Cached unread pulls with no located artifact.
    #[default]
    Unseen,
    /// Newly published pulls, fetched from the service.
    New,
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub scan_dir: PathBuf,
    /// Maximum weighted distance for an acceptable match.
    pub threshold: f64,
    /// Act on acceptable matches instead of only reporting them.
    pub commit: bool,
    pub candidates: CandidateSource,
}

/// What happened to one scanned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadAction {
    /// Match not acceptable, or the run is not committing.
    Reported,
    /// An artifact already existed for the pull.
    AlreadyPresent,
    Uploaded,
    Failed,
}

/// Best match for one scanned file and the action taken.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub file: PathBuf,
    pub pull_id: u64,
    pub weighted_distance: f64,
    pub acceptable: bool,
    pub action: UploadAction,
}

/// Recursively list comic archives under `directory`, sorted by path.
pub async fn scan_dir(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![directory.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(ArchiveFormat::from_file_name)
                .is_some()
            {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

pub struct UploadRunner {
    catalog: Arc<PullCatalog>,
    locator: Arc<RemoteLocator>,
    matcher: Matcher,
}

impl UploadRunner {
    pub fn new(catalog: Arc<PullCatalog>, locator: Arc<RemoteLocator>, matcher: Matcher) -> Self {
        Self {
            catalog,
            locator,
            matcher,
        }
    }

    pub async fn run(&self, options: &UploadOptions) -> Result<Vec<UploadOutcome>, UploadError> {
        let files = scan_dir(&options.scan_dir)
            .await
            .map_err(|source| UploadError::Scan {
                path: options.scan_dir.clone(),
                source,
            })?;
        debug!(count = files.len(), "Candidate files");

        let pulls = match options.candidates {
            CandidateSource::Unseen => self.catalog.list_unseen()?,
            CandidateSource::New => self.catalog.fetch_new().await?,
        };
        debug!(count = pulls.len(), "Candidate pulls");

        let mut outcomes = Vec::new();
        for file in files {
            let Some(file_name) = file.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some(best) = self.matcher.best_match(file_name, &pulls) else {
                continue;
            };

            let acceptable = best.is_acceptable(options.threshold);
            debug!(
                "Match: {:5} <{:.4}> [{} -> {}]",
                acceptable,
                best.weighted_distance,
                best.normalized_candidate.canonical,
                best.normalized_pull.canonical
            );

            let action = if acceptable && options.commit {
                self.commit_file(best.pull, &file).await
            } else {
                UploadAction::Reported
            };
            outcomes.push(outcome(&file, &best, acceptable, action));
        }

        Ok(outcomes)
    }

    /// Upload `file` for `pull` unless the pull already has an artifact.
    async fn commit_file(&self, pull: &Pull, file: &Path) -> UploadAction {
        match self.locator.locate(pull.id).await {
            Ok(Some(_)) => {
                info!(pull_id = pull.id, "Pull has already been uploaded, skipping");
                self.pull_if_new(pull).await;
                metrics::UPLOADS_TOTAL
                    .with_label_values(&["already_present"])
                    .inc();
                return UploadAction::AlreadyPresent;
            }
            Ok(None) => {}
            Err(e) => {
                error!(pull_id = pull.id, "Unable to check for existing upload: {}", e);
                metrics::UPLOADS_TOTAL.with_label_values(&["failed"]).inc();
                return UploadAction::Failed;
            }
        }

        match self.send_file(pull, file).await {
            Ok(()) => {
                if let Err(e) = self.locator.locate(pull.id).await {
                    warn!(pull_id = pull.id, "Uploaded but could not record presence: {}", e);
                }
                self.pull_if_new(pull).await;
                metrics::UPLOADS_TOTAL.with_label_values(&["uploaded"]).inc();
                UploadAction::Uploaded
            }
            Err(e) => {
                error!(pull_id = pull.id, "Error copying file: {}", e);
                metrics::UPLOADS_TOTAL.with_label_values(&["failed"]).inc();
                UploadAction::Failed
            }
        }
    }

    async fn send_file(
        &self,
        pull: &Pull,
        file: &Path,
    ) -> Result<(), crate::storage::StorageError> {
        let file_name = file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let object_name = format!("{}/{}", self.locator.prefix_for(pull.id), file_name);
        let content_type = ArchiveFormat::from_file_name(file_name)
            .map(|format| format.content_type())
            .unwrap_or("application/octet-stream");
        let bucket = self.locator.bucket();
        let store = self.locator.store();

        info!("Uploading file {} -> gs://{}/{}", file.display(), bucket, object_name);
        self.locator
            .policy()
            .run(self.locator.sleeper(), "upload", || {
                store.upload(file, bucket, &object_name, content_type)
            })
            .await?;
        Ok(())
    }

    async fn pull_if_new(&self, pull: &Pull) {
        if pull.pulled {
            return;
        }
        if let Err(e) = self.catalog.mark_pulled(pull.id).await {
            warn!(pull_id = pull.id, "Unable to pull: {}", e);
        }
    }
}

fn outcome(file: &Path, best: &MatchResult<'_>, acceptable: bool, action: UploadAction) -> UploadOutcome {
    UploadOutcome {
        file: file.to_path_buf(),
        pull_id: best.pull.id,
        weighted_distance: best.weighted_distance,
        acceptable,
        action,
    }
}
