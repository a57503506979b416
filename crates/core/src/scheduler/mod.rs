//! Sync scheduling: which pulls to mirror this run, and which local files
//! to drop afterwards.

mod plan;
mod reconcile;

pub use plan::SyncScheduler;
pub use reconcile::{
    expire_files, expired_ids, extract_id, identify_local, ExpiryMode, LocalFile,
};
