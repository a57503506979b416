use async_trait::async_trait;

use super::{Pull, PullDbError, PullPage, UpdateResult};

/// Which paged listing to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullList {
    /// Pulls on the user's list that have not been read.
    Unread,
    /// Newly published pulls not yet added to the list.
    New,
}

impl PullList {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullList::Unread => "unread",
            PullList::New => "new",
        }
    }
}

/// Source of authoritative pull state.
#[async_trait]
pub trait PullSource: Send + Sync {
    /// Get the source name (for logging).
    fn name(&self) -> &str;

    /// Read one page of a listing. `cursor` is the previous page's position.
    async fn list_page(
        &self,
        list: PullList,
        cursor: Option<&str>,
    ) -> Result<PullPage, PullDbError>;

    /// Fetch a single pull. `None` if the service does not know the id.
    async fn get_pull(&self, id: u64) -> Result<Option<Pull>, PullDbError>;

    /// Mark pulls as pulled.
    async fn update(&self, ids: &[u64]) -> Result<UpdateResult, PullDbError>;

    /// Mark pulls as read.
    async fn mark_read(&self, ids: &[u64]) -> Result<UpdateResult, PullDbError>;
}
