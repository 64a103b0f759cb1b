//! In-process page caching (Tier-1, Tier-2) and snapshot bookkeeping. No
//! durable storage or network I/O lives here — see `pageserver-storage` for
//! the backends these tiers sit in front of.

mod local_file_cache;
mod page_cache;
mod snapshot;

pub use local_file_cache::LocalFileCache;
pub use page_cache::{CacheKey, CacheLookup, PageCache};
pub use snapshot::{Snapshot, SnapshotIndex};
