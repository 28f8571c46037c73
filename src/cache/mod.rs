//! Response caching for offline support.
//!
//! This module provides the two caching strategies used by the proxy:
//! - cache-first with network fallback for pages and static assets
//! - network-first with cache fallback for API reads
//!
//! plus the SQLite storage that also holds the pending-write queue blob.

mod layer;
mod storage;
mod traits;

pub use layer::{CacheLayer, InstallReport};
pub use storage::{CacheStorage, NoopStorage, QueueStore, SqliteStorage};
pub use traits::{CacheKey, CacheResult, CacheSource, CachedResponse};
