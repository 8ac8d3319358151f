mod registry;
mod store;
mod types;

pub use registry::{SessionRegistry, FEED_INDEX_KEY, SESSION_KEY};
pub use store::{FileStore, MemoryStore, StateStore};
pub use types::{FeedCandidate, FeedIndex, StoreError, TabId, TabSession};
