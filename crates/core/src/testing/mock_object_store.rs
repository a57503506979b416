//! Mock object store for testing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage::{encode_md5, ObjectStore, RemoteFileDescriptor, StorageError};

/// A recorded upload for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub source: PathBuf,
    pub bucket: String,
    pub object_name: String,
    pub content_type: String,
}

#[derive(Debug, Clone)]
struct StoredObject {
    descriptor: RemoteFileDescriptor,
    body: Vec<u8>,
}

/// In-memory object store.
///
/// Provides controllable behavior for testing:
/// - Seed objects with [`MockObjectStore::put`]
/// - Inject transient listing or download failures
/// - Count calls and record uploads
#[derive(Debug, Default)]
pub struct MockObjectStore {
    objects: Mutex<Vec<StoredObject>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    list_calls: AtomicUsize,
    download_calls: AtomicUsize,
    failing_lists: AtomicUsize,
    failing_downloads: AtomicUsize,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object with a small placeholder body.
    pub fn put(&self, bucket: &str, descriptor: RemoteFileDescriptor) {
        self.put_with_body(bucket, descriptor, b"archive".to_vec());
    }

    pub fn put_with_body(&self, bucket: &str, mut descriptor: RemoteFileDescriptor, body: Vec<u8>) {
        descriptor.bucket = bucket.to_string();
        self.objects
            .lock()
            .unwrap()
            .push(StoredObject { descriptor, body });
    }

    /// Make the next `count` listings fail with a timeout.
    pub fn fail_next_lists(&self, count: usize) {
        self.failing_lists.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` downloads fail with a dropped connection.
    pub fn fail_next_downloads(&self, count: usize) {
        self.failing_downloads.store(count, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<RemoteFileDescriptor>, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_lists) {
            return Err(StorageError::Timeout("mock listing timed out".to_string()));
        }

        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.descriptor.bucket == bucket && o.descriptor.object_name.starts_with(prefix))
            .map(|o| o.descriptor.clone())
            .collect())
    }

    async fn download(
        &self,
        descriptor: &RemoteFileDescriptor,
        destination: &Path,
    ) -> Result<u64, StorageError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_downloads) {
            return Err(StorageError::ConnectionFailed(
                "mock connection reset".to_string(),
            ));
        }

        let body = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .find(|o| {
                o.descriptor.bucket == descriptor.bucket
                    && o.descriptor.object_name == descriptor.object_name
            })
            .map(|o| o.body.clone())
            .ok_or_else(|| StorageError::Http {
                status: 404,
                message: format!("No such object: {}", descriptor.object_name),
            })?;

        tokio::fs::write(destination, &body)
            .await
            .map_err(|e| StorageError::io(destination, e))?;
        Ok(body.len() as u64)
    }

    async fn upload(
        &self,
        source: &Path,
        bucket: &str,
        object_name: &str,
        content_type: &str,
    ) -> Result<RemoteFileDescriptor, StorageError> {
        let body = tokio::fs::read(source)
            .await
            .map_err(|e| StorageError::io(source, e))?;

        let descriptor = RemoteFileDescriptor {
            bucket: bucket.to_string(),
            object_name: object_name.to_string(),
            content_type: content_type.to_string(),
            media_link: format!("mock://{}/{}", bucket, object_name),
            size: Some(body.len().to_string()),
            md5_hash: Some(encode_md5(md5::compute(&body))),
        };

        self.uploads.lock().unwrap().push(RecordedUpload {
            source: source.to_path_buf(),
            bucket: bucket.to_string(),
            object_name: object_name.to_string(),
            content_type: content_type.to_string(),
        });
        self.objects.lock().unwrap().push(StoredObject {
            descriptor: descriptor.clone(),
            body,
        });
        Ok(descriptor)
    }
}
