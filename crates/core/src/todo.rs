//! Keep a todo.txt reading list in step with the unread pulls.
//!
//! Lines tagged with `[<id>]` belong to pulls. A sync rewrites the file in
//! weight order: lines already completed (`x ` prefix) are kept as written,
//! every other unread pull gets a fresh line. Lines for ids no longer unread
//! and untagged lines are appended unchanged. A push marks the pulls whose
//! lines are completed as read.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheError, CacheLock};
use crate::clock::Clock;
use crate::pulldb::{Pull, PullCatalog, PullDbError};

/// Name of the lock held while the todo file is rewritten.
pub const TODO_LOCK: &str = "todo";

/// Sort weight for pulls outside any stream, after most streamed pulls.
pub const STREAMLESS_WEIGHT: f64 = 2.0;

static ENTRY_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());

#[derive(Debug, Error)]
pub enum TodoError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Pull list error: {0}")]
    PullDb(#[from] PullDbError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TodoError + '_ {
    move |source| TodoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Parsed todo file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TodoFile {
    /// Tagged lines by id, in file order.
    pub entries: Vec<(u64, String)>,
    /// Lines without an id tag.
    pub extra: Vec<String>,
}

impl TodoFile {
    pub fn parse(contents: &str) -> Self {
        let mut file = TodoFile::default();
        for line in contents.lines() {
            let line = line.trim();
            let id = ENTRY_ID
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok());
            match id {
                Some(id) => file.entries.push((id, line.to_string())),
                None => file.extra.push(line.to_string()),
            }
        }
        file
    }

    fn lines_by_id(&self) -> HashMap<u64, &str> {
        self.entries
            .iter()
            .map(|(id, line)| (*id, line.as_str()))
            .collect()
    }
}

fn is_completed(line: &str) -> bool {
    line.starts_with("x ")
}

/// Todo line for a pull: `"{name} +{stream} {{{volume}}} [{id}]"`.
///
/// The stream and volume tokens are left out when the pull has none.
pub fn todo_line(pull: &Pull) -> String {
    let mut line = pull.display_name();
    if let Some(stream_id) = &pull.stream_id {
        line.push_str(&format!(" +{}", stream_id));
    }
    if let Some(volume_id) = &pull.volume_id {
        line.push_str(&format!(" {{{}}}", volume_id));
    }
    line.push_str(&format!(" [{}]", pull.id));
    line
}

/// Unread pulls in todo order, each once.
fn weighted(pulls: &[Pull]) -> Vec<&Pull> {
    let weight = |pull: &Pull| match pull.stream_id {
        Some(_) => pull.weight,
        None => STREAMLESS_WEIGHT,
    };
    let mut ordered: Vec<&Pull> = pulls.iter().collect();
    ordered.sort_by(|a, b| weight(a).total_cmp(&weight(b)).then(a.id.cmp(&b.id)));

    let mut handled = HashSet::new();
    ordered.retain(|pull| {
        let first = handled.insert(pull.id);
        if !first {
            debug!(pull_id = pull.id, "Skipping already handled pull");
        }
        first
    });
    ordered
}

/// New file contents for the current unread pulls.
pub fn reconcile(todo: &TodoFile, pulls: &[Pull]) -> Vec<String> {
    let existing = todo.lines_by_id();
    let mut lines = Vec::new();
    let mut handled = HashSet::new();

    for pull in weighted(pulls) {
        match existing.get(&pull.id) {
            Some(line) if is_completed(line) => lines.push(line.to_string()),
            _ => lines.push(todo_line(pull)),
        }
        handled.insert(pull.id);
    }

    let mut unknown_seen = HashSet::new();
    for (id, line) in &todo.entries {
        if !handled.contains(id) && unknown_seen.insert(*id) {
            lines.push(line.clone());
        }
    }
    lines.extend(todo.extra.iter().cloned());
    lines
}

/// Unread pulls whose todo lines are completed.
pub fn completed_ids(todo: &TodoFile, pulls: &[Pull]) -> Vec<u64> {
    let existing = todo.lines_by_id();
    weighted(pulls)
        .into_iter()
        .filter(|pull| existing.get(&pull.id).is_some_and(|line| is_completed(line)))
        .map(|pull| pull.id)
        .collect()
}

/// Runs todo file reconciliation against the cached pull list.
pub struct TodoRunner {
    catalog: Arc<PullCatalog>,
    clock: Arc<dyn Clock>,
}

impl TodoRunner {
    pub fn new(catalog: Arc<PullCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self { catalog, clock }
    }

    async fn read(&self, path: &Path) -> Result<TodoFile, TodoError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(TodoFile::parse(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TodoFile::default()),
            Err(e) => Err(io_error(path)(e)),
        }
    }

    /// Rewrite the todo file, keeping the old one as `<file>.<unix time>`.
    ///
    /// Returns the backup path, if there was a file to back up.
    pub async fn sync(&self, path: &Path) -> Result<Option<PathBuf>, TodoError> {
        let lock = CacheLock::acquire(self.catalog.cache().clone(), TODO_LOCK)?;
        let result = self.rewrite(path).await;
        lock.release()?;
        result
    }

    async fn rewrite(&self, path: &Path) -> Result<Option<PathBuf>, TodoError> {
        let todo = self.read(path).await?;
        let pulls = self.catalog.list_unread()?;
        let lines = reconcile(&todo, &pulls);

        let backup = if tokio::fs::try_exists(path).await.map_err(io_error(path))? {
            let backup = PathBuf::from(format!(
                "{}.{}",
                path.display(),
                self.clock.now().timestamp()
            ));
            tokio::fs::rename(path, &backup)
                .await
                .map_err(io_error(path))?;
            Some(backup)
        } else {
            None
        };

        tokio::fs::write(path, lines.join("\n"))
            .await
            .map_err(io_error(path))?;
        info!(lines = lines.len(), "Wrote {}", path.display());
        Ok(backup)
    }

    /// Mark pulls with completed lines as read. Returns the ids updated.
    pub async fn push(&self, path: &Path) -> Result<Vec<u64>, TodoError> {
        let lock = CacheLock::acquire(self.catalog.cache().clone(), TODO_LOCK)?;
        let collected = match self.read(path).await {
            Ok(todo) => self
                .catalog
                .list_unread()
                .map(|pulls| completed_ids(&todo, &pulls))
                .map_err(TodoError::from),
            Err(e) => Err(e),
        };
        lock.release()?;

        let ids = collected?;
        info!(count = ids.len(), "Marking completed pulls as read");
        Ok(self.catalog.mark_read(&ids).await?)
    }
}
