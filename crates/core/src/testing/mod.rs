//! Testing utilities and mock implementations.
//!
//! Mocks for every external collaborator, so whole sync and upload runs can
//! be exercised without a pull list service or an object store.
//!
//! # Example
//!
//! ```rust,ignore
//! use pullsync_core::testing::{archive_descriptor, MockObjectStore, MockPullSource};
//!
//! let source = MockPullSource::new();
//! source.add_unread(Pull::new(1000, "Test Issue 1", 0.1));
//!
//! let store = MockObjectStore::new();
//! store.put("long-box", archive_descriptor(1000, "Test Issue 1.cbz"));
//! ```

mod mock_object_store;
mod mock_pull_source;
mod mock_time;

pub use fixtures::archive_descriptor;
pub use mock_object_store::{MockObjectStore, RecordedUpload};
pub use mock_pull_source::MockPullSource;
pub use mock_time::{ManualClock, RecordingSleeper};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::locator::{storage_prefix, DEFAULT_PREFIX_ROOT};
    use crate::pulldb::Pull;
    use crate::storage::{ArchiveFormat, RemoteFileDescriptor};

    /// Descriptor for a file stored under an id's prefix in `long-box`.
    ///
    /// The content type follows the file extension; anything that is not an
    /// archive becomes `application/octet-stream`.
    pub fn archive_descriptor(id: u64, file_name: &str) -> RemoteFileDescriptor {
        let object_name = format!("{}/{}", storage_prefix(DEFAULT_PREFIX_ROOT, id), file_name);
        let content_type = ArchiveFormat::from_file_name(file_name)
            .map(|format| format.content_type())
            .unwrap_or("application/octet-stream");

        RemoteFileDescriptor {
            bucket: "long-box".to_string(),
            media_link: format!("mock://long-box/{}", object_name),
            object_name,
            content_type: content_type.to_string(),
            size: None,
            md5_hash: None,
        }
    }

    /// Unread pull in a stream.
    pub fn streamed_pull(id: u64, name: &str, weight: f64, stream_id: &str) -> Pull {
        Pull::new(id, name, weight).with_stream(stream_id)
    }

    /// Pull from the new list, not yet pulled.
    pub fn new_pull(id: u64, name: &str) -> Pull {
        let mut pull = Pull::new(id, name, 0.0);
        pull.pulled = false;
        pull
    }
}
