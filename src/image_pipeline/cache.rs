//! Disk cache of decoded rasters
//!
//! Versioned keys, the content-addressed file cache and the background
//! writer that fills it.

pub mod file_cache;
pub mod key;
pub mod persister;

pub use file_cache::{DiskCache, FileCache, FileCacheConfig, PendingFile};
pub use key::{CacheKey, FORMAT_VERSION};
pub use persister::{BackgroundCachePersister, CacheJob};
