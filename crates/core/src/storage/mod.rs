//! Remote object store holding the archive collection.

mod error;
mod gcs;
mod traits;
mod types;

pub use error::StorageError;
pub use gcs::{encode_md5, GcsObjectStore};
pub use traits::ObjectStore;
pub use types::{ArchiveFormat, RemoteFileDescriptor};
