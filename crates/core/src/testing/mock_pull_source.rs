//! Mock pull list service for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::pulldb::{
    Pull, PullDbError, PullEnvelope, PullList, PullPage, PullSource, UpdateResult,
};

#[derive(Debug, Default)]
struct Lists {
    unread: Vec<Pull>,
    new: Vec<Pull>,
}

/// In-memory pull list service.
///
/// Unread pulls are listed in insertion order, `page_size` per page, with
/// the next offset as the cursor. `update` moves pulls from the new list to
/// the unread list; `mark_read` flags unread pulls as read.
#[derive(Debug)]
pub struct MockPullSource {
    lists: Mutex<Lists>,
    page_size: AtomicUsize,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    fail_lists: AtomicBool,
    pulled: Mutex<Vec<u64>>,
    read: Mutex<Vec<u64>>,
}

impl Default for MockPullSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPullSource {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(Lists::default()),
            page_size: AtomicUsize::new(50),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            fail_lists: AtomicBool::new(false),
            pulled: Mutex::new(Vec::new()),
            read: Mutex::new(Vec::new()),
        }
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.page_size.store(page_size.max(1), Ordering::SeqCst);
    }

    pub fn add_unread(&self, pull: Pull) {
        self.lists.lock().unwrap().unread.push(pull);
    }

    pub fn add_new(&self, pull: Pull) {
        self.lists.lock().unwrap().new.push(pull);
    }

    /// Make every listing fail with a server error.
    pub fn set_fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Ids accepted by `update`, in call order.
    pub fn pulled_ids(&self) -> Vec<u64> {
        self.pulled.lock().unwrap().clone()
    }

    /// Ids accepted by `mark_read`, in call order.
    pub fn read_ids(&self) -> Vec<u64> {
        self.read.lock().unwrap().clone()
    }
}

#[async_trait]
impl PullSource for MockPullSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_page(
        &self,
        list: PullList,
        cursor: Option<&str>,
    ) -> Result<PullPage, PullDbError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(PullDbError::Fetch {
                path: format!("/api/pulls/list/{}", list.as_str()),
                status: 500,
            });
        }

        let offset: usize = match cursor {
            Some(cursor) => cursor
                .parse()
                .map_err(|_| PullDbError::Decode(format!("bad cursor {}", cursor)))?,
            None => 0,
        };
        let page_size = self.page_size.load(Ordering::SeqCst);

        let lists = self.lists.lock().unwrap();
        let source: Vec<&Pull> = match list {
            PullList::Unread => lists.unread.iter().filter(|p| !p.read).collect(),
            PullList::New => lists.new.iter().collect(),
        };
        let end = (offset + page_size).min(source.len());
        let results = source
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|pull| PullEnvelope {
                pull: (*pull).clone(),
            })
            .collect();
        let more = end < source.len();

        Ok(PullPage {
            results,
            more,
            position: more.then(|| end.to_string()),
        })
    }

    async fn get_pull(&self, id: u64) -> Result<Option<Pull>, PullDbError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let lists = self.lists.lock().unwrap();
        Ok(lists
            .unread
            .iter()
            .chain(lists.new.iter())
            .find(|pull| pull.id == id)
            .cloned())
    }

    async fn update(&self, ids: &[u64]) -> Result<UpdateResult, PullDbError> {
        let mut result = UpdateResult::default();
        let mut lists = self.lists.lock().unwrap();
        for &id in ids {
            if let Some(index) = lists.new.iter().position(|pull| pull.id == id) {
                let mut pull = lists.new.remove(index);
                pull.pulled = true;
                lists.unread.push(pull);
                result.updated.push(id);
            } else if lists.unread.iter().any(|pull| pull.id == id) {
                result.updated.push(id);
            } else {
                result.failed.push(id);
            }
        }
        self.pulled.lock().unwrap().extend(&result.updated);
        Ok(result)
    }

    async fn mark_read(&self, ids: &[u64]) -> Result<UpdateResult, PullDbError> {
        let mut result = UpdateResult::default();
        let mut lists = self.lists.lock().unwrap();
        for &id in ids {
            match lists.unread.iter_mut().find(|pull| pull.id == id) {
                Some(pull) => {
                    pull.read = true;
                    result.updated.push(id);
                }
                None => result.failed.push(id),
            }
        }
        self.read.lock().unwrap().extend(&result.updated);
        Ok(result)
    }
}
