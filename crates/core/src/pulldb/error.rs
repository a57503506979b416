use thiserror::Error;

use crate::cache::CacheError;

/// Errors from the pull list service or its cached copy.
#[derive(Debug, Error)]
pub enum PullDbError {
    /// A listing or lookup returned a non-success status.
    #[error("Pull list request to {path} failed with status {status}")]
    Fetch { path: String, status: u16 },

    /// The update endpoint rejected the request.
    #[error("Pull update failed with status {status}: {message}")]
    Update { status: u16, message: String },

    /// Network failure talking to the service.
    #[error("Pull list transport error: {0}")]
    Transport(String),

    /// A response or cached payload could not be decoded.
    #[error("Failed to decode pull data: {0}")]
    Decode(String),

    /// The service has no pull with this id.
    #[error("Pull not found: {0}")]
    NotFound(u64),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl From<reqwest::Error> for PullDbError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PullDbError::Decode(e.to_string())
        } else {
            PullDbError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for PullDbError {
    fn from(e: serde_json::Error) -> Self {
        PullDbError::Decode(e.to_string())
    }
}
