use std::path::Path;

use async_trait::async_trait;

use super::{RemoteFileDescriptor, StorageError};

/// Remote object store holding the archive files.
///
/// Implementations make a single attempt per call; callers wrap calls in a
/// [`RetryPolicy`](crate::retry::RetryPolicy).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get the store name (for logging).
    fn name(&self) -> &str;

    /// List every object under `prefix`. An empty prefix match is `Ok(vec![])`.
    async fn list(&self, bucket: &str, prefix: &str)
        -> Result<Vec<RemoteFileDescriptor>, StorageError>;

    /// Download an object to `destination`. Returns the number of bytes written.
    ///
    /// A failed download leaves no file at `destination`.
    async fn download(
        &self,
        descriptor: &RemoteFileDescriptor,
        destination: &Path,
    ) -> Result<u64, StorageError>;

    /// Upload a local file as `object_name`.
    async fn upload(
        &self,
        source: &Path,
        bucket: &str,
        object_name: &str,
        content_type: &str,
    ) -> Result<RemoteFileDescriptor, StorageError>;
}
