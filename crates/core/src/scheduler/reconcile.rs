//! Local mirror reconciliation: find and remove files no longer wanted.
//!
//! Mirrored files embed their pull id as a six character hex token, e.g.
//! `Saga 43 [0003e8].cbz`. Files without a parseable token are never touched.

use std::collections::{BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::{debug, info, warn};

use crate::cache::keys::pull_key;
use crate::cache::{CacheError, PresenceCache};
use crate::metrics;
use crate::storage::ArchiveFormat;

static ID_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([a-z0-9]{6})\b").unwrap());

/// How to decide which local files have expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryMode {
    /// Remove every file not admitted in this run, even if still unread.
    Strict,
    /// Remove files whose pull is no longer in the cached unread set.
    Unread,
}

impl ExpiryMode {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            ExpiryMode::Strict
        } else {
            ExpiryMode::Unread
        }
    }
}

/// A file in the mirror directory with its embedded pull id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub id: u64,
}

impl LocalFile {
    pub fn is_archive(&self) -> bool {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(ArchiveFormat::from_file_name)
            .is_some()
    }
}

/// Pull id embedded in a mirror filename.
///
/// The last six character token that parses as non-zero hex wins, so a
/// title word such as `decade` does not shadow the bracketed id at the end.
pub fn extract_id(file_name: &str) -> Option<u64> {
    ID_TOKEN
        .captures_iter(file_name)
        .filter_map(|caps| caps.get(1))
        .filter_map(|token| u64::from_str_radix(token.as_str(), 16).ok())
        .filter(|id| *id != 0)
        .last()
}

/// List mirror files that carry a pull id, sorted by path.
pub async fn identify_local(directory: &Path) -> io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            debug!("Ignoring non UTF-8 filename {:?}", file_name);
            continue;
        };
        if let Some(id) = extract_id(name) {
            files.push(LocalFile {
                path: entry.path(),
                id,
            });
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Ids among `existing` whose files should be removed.
pub fn expired_ids(
    existing: &BTreeSet<u64>,
    admitted: &HashSet<u64>,
    mode: ExpiryMode,
    cache: &dyn PresenceCache,
) -> Result<BTreeSet<u64>, CacheError> {
    match mode {
        ExpiryMode::Strict => Ok(existing
            .iter()
            .filter(|id| !admitted.contains(id))
            .copied()
            .collect()),
        ExpiryMode::Unread => {
            let mut expired = BTreeSet::new();
            for id in existing {
                if cache.get(&pull_key(*id))?.is_none() {
                    expired.insert(*id);
                }
            }
            Ok(expired)
        }
    }
}

/// Delete archive files whose id is expired. Returns the removed paths.
///
/// A failed delete is logged and does not stop the pass.
pub async fn expire_files(files: &[LocalFile], expired: &BTreeSet<u64>) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for file in files {
        if !expired.contains(&file.id) || !file.is_archive() {
            continue;
        }
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => {
                info!(pull_id = file.id, "Removing old pull {}", file.path.display());
                metrics::FILES_EXPIRED.inc();
                removed.push(file.path.clone());
            }
            Err(e) => warn!("Failed to remove {}: {}", file.path.display(), e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        std::fs::write(dir.path().join(name), b"archive").unwrap();
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(extract_id("Saga 43 [0003e8].cbz"), Some(1000));
        assert_eq!(extract_id("Decade 1 [00001f].cbr"), Some(0x1f));
        assert_eq!(extract_id("notes zzzzzz.cbz"), None);
        assert_eq!(extract_id("Zero [000000].cbz"), None);
        assert_eq!(extract_id("short [abc].cbz"), None);
    }

    #[tokio::test]
    async fn test_only_expired_ids_are_deleted() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "One 1 [000001].cbz");
        touch(&dir, "Two 1 [000002].cbr");
        touch(&dir, "Three 1 [000003].cbz");
        touch(&dir, "Junk [zzzzzz].cbz");

        let files = identify_local(dir.path()).await.unwrap();
        let existing: BTreeSet<u64> = files.iter().map(|f| f.id).collect();
        assert_eq!(existing, BTreeSet::from([1, 2, 3]));

        let admitted = HashSet::from([1, 3]);
        let cache = MemoryCache::new();
        let expired = expired_ids(&existing, &admitted, ExpiryMode::Strict, &cache).unwrap();
        assert_eq!(expired, BTreeSet::from([2]));

        let removed = expire_files(&files, &expired).await;
        assert_eq!(removed, vec![dir.path().join("Two 1 [000002].cbr")]);
        assert!(dir.path().join("One 1 [000001].cbz").exists());
        assert!(dir.path().join("Three 1 [000003].cbz").exists());
        assert!(dir.path().join("Junk [zzzzzz].cbz").exists());
    }

    #[tokio::test]
    async fn test_non_archives_are_kept() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "Two 1 [000002].txt");

        let files = identify_local(dir.path()).await.unwrap();
        assert_eq!(files.len(), 1);
        let removed = expire_files(&files, &BTreeSet::from([2])).await;
        assert!(removed.is_empty());
        assert!(dir.path().join("Two 1 [000002].txt").exists());
    }

    #[test]
    fn test_unread_mode_uses_cached_pulls() {
        let cache = MemoryCache::new();
        cache.set(&pull_key(1), "{}", None).unwrap();

        let existing = BTreeSet::from([1, 2]);
        let expired =
            expired_ids(&existing, &HashSet::new(), ExpiryMode::Unread, &cache).unwrap();
        assert_eq!(expired, BTreeSet::from([2]));
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(ExpiryMode::from_strict(true), ExpiryMode::Strict);
        assert_eq!(ExpiryMode::from_strict(false), ExpiryMode::Unread);
    }
}
