use std::path::PathBuf;

use thiserror::Error;

use crate::retry::Retryable;

/// Errors from the remote object store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object store request timed out: {0}")]
    Timeout(String),

    #[error("Failed to connect to object store: {0}")]
    ConnectionFailed(String),

    #[error("Object store returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Failed to decode object store response: {0}")]
    Decode(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checksum mismatch for {object}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        object: String,
        expected: String,
        actual: String,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

impl Retryable for StorageError {
    /// Timeouts, connection failures and HTTP 408, 429 or 5xx.
    fn is_transient(&self) -> bool {
        match self {
            StorageError::Timeout(_) | StorageError::ConnectionFailed(_) => true,
            StorageError::Http { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StorageError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() || e.is_body() {
            StorageError::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            StorageError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            StorageError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            StorageError::ConnectionFailed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> StorageError {
        StorageError::Http {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::Timeout("slow".into()).is_transient());
        assert!(StorageError::ConnectionFailed("reset".into()).is_transient());
        assert!(http(408).is_transient());
        assert!(http(429).is_transient());
        assert!(http(500).is_transient());
        assert!(http(503).is_transient());

        assert!(!http(403).is_transient());
        assert!(!http(404).is_transient());
        assert!(!StorageError::Decode("bad".into()).is_transient());
        assert!(!StorageError::ChecksumMismatch {
            object: "o".into(),
            expected: "a".into(),
            actual: "b".into(),
        }
        .is_transient());
    }
}
