//! Pull list: the user's wanted issues, their read state and weights.

mod catalog;
mod error;
mod http;
mod traits;
mod types;

pub use catalog::PullCatalog;
pub use error::PullDbError;
pub use http::HttpPullSource;
pub use traits::{PullList, PullSource};
pub use types::{Pull, PullEnvelope, PullLookup, PullPage, UpdateResult};
