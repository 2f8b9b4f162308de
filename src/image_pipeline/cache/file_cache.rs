//! Content-addressed disk cache of decoded rasters.
//!
//! Entries are plain files named after [`CacheKey::file_name`]. New entries
//! are written to a `.pending-` temporary in the same directory and renamed
//! into place by [`DiskCache::finalize`], so readers never see a partial
//! file. A `version` file stamps the directory layout; a mismatch wipes the
//! directory. Total size is kept under a byte capacity by evicting the
//! least recently used entries.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::image_pipeline::cache::key::CacheKey;
use crate::image_pipeline::common::error::CacheError;

/// Layout version of the cache directory itself.
const CACHE_DIR_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";
const PENDING_PREFIX: &str = ".pending-";
const ENTRY_SUFFIX: &str = ".tif";

/// Disk cache seam used by the pipeline and the background persister.
pub trait DiskCache: Send + Sync {
    fn exists(&self, key: &CacheKey) -> bool;
    fn open(&self, key: &CacheKey) -> Option<File>;
    /// A writable temporary that becomes the entry for `key` once finalized.
    fn create_file_for(&self, key: &CacheKey) -> Result<PendingFile, CacheError>;
    fn finalize(&self, file: PendingFile) -> Result<(), CacheError>;
}

/// An entry being written. Dropping it without finalizing discards it.
#[derive(Debug)]
pub struct PendingFile {
    key: CacheKey,
    file: NamedTempFile,
}

impl PendingFile {
    pub fn new(key: CacheKey, file: NamedTempFile) -> Self {
        Self { key, file }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn file_mut(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    pub fn into_parts(self) -> (CacheKey, NamedTempFile) {
        (self.key, self.file)
    }
}

#[derive(Debug, Clone)]
pub struct FileCacheConfig {
    pub directory: PathBuf,
    /// Upper bound on the total size of all entries, in bytes.
    pub capacity: u64,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        let base = dirs_next::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            directory: base.join("darkroom").join("raw"),
            capacity: 2 * 1024 * 1024 * 1024,
        }
    }
}

struct Entry {
    size: u64,
    last_used: u64,
}

#[derive(Default)]
struct Index {
    entries: HashMap<String, Entry>,
    total: u64,
    clock: u64,
}

impl Index {
    fn touch(&mut self, name: &str) {
        self.clock += 1;
        if let Some(entry) = self.entries.get_mut(name) {
            entry.last_used = self.clock;
        }
    }

    fn insert(&mut self, name: String, size: u64) {
        self.clock += 1;
        let entry = Entry { size, last_used: self.clock };
        if let Some(old) = self.entries.insert(name, entry) {
            self.total -= old.size;
        }
        self.total += size;
    }

    fn remove(&mut self, name: &str) -> Option<u64> {
        let entry = self.entries.remove(name)?;
        self.total -= entry.size;
        Some(entry.size)
    }
}

pub struct FileCache {
    directory: PathBuf,
    capacity: u64,
    index: Mutex<Index>,
}

fn is_entry(name: &str) -> bool {
    name.ends_with(ENTRY_SUFFIX) && !name.starts_with(PENDING_PREFIX)
}

fn version_matches(path: &Path) -> bool {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        == Some(CACHE_DIR_VERSION)
}

impl FileCache {
    pub fn new(config: FileCacheConfig) -> Result<Self, CacheError> {
        fs::create_dir_all(&config.directory)?;
        let cache = Self {
            directory: config.directory,
            capacity: config.capacity,
            index: Mutex::new(Index::default()),
        };

        let version_file = cache.directory.join(VERSION_FILE);
        if !version_matches(&version_file) {
            info!(dir = %cache.directory.display(), "Cache layout changed, clearing");
            cache.clear()?;
            fs::write(&version_file, CACHE_DIR_VERSION.to_string())?;
        } else {
            cache.scan()?;
        }

        let total = cache.size();
        debug!(dir = %cache.directory.display(), bytes = total, "File cache opened");
        cache.evict(None);
        Ok(cache)
    }

    fn lock(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuilds the index from the directory, oldest entries first, and
    /// removes temporaries left behind by an interrupted writer.
    fn scan(&self) -> Result<(), CacheError> {
        let mut found = Vec::new();
        for dirent in fs::read_dir(&self.directory)? {
            let dirent = dirent?;
            let name = dirent.file_name().to_string_lossy().into_owned();
            if name.starts_with(PENDING_PREFIX) {
                match fs::remove_file(dirent.path()) {
                    Ok(()) => debug!(file = %name, "Removed stale cache temporary"),
                    Err(e) => warn!(file = %name, error = %e, "Failed to remove stale cache temporary"),
                }
                continue;
            }
            if !is_entry(&name) {
                continue;
            }
            let meta = dirent.metadata()?;
            let stamp = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((stamp, name, meta.len()));
        }
        found.sort();

        let mut index = self.lock();
        for (_, name, size) in found {
            index.insert(name, size);
        }
        Ok(())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Total bytes of all entries.
    pub fn size(&self) -> u64 {
        self.lock().total
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(key.file_name())
    }

    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let name = key.file_name();
        let mut index = self.lock();
        index.remove(&name);
        match fs::remove_file(self.directory.join(&name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every entry and temporary. The version stamp stays.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut index = self.lock();
        for dirent in fs::read_dir(&self.directory)? {
            let dirent = dirent?;
            let name = dirent.file_name().to_string_lossy().into_owned();
            if is_entry(&name) || name.starts_with(PENDING_PREFIX) {
                fs::remove_file(dirent.path())?;
            }
        }
        *index = Index::default();
        Ok(())
    }

    /// Drops least recently used entries until the total fits. `keep` is
    /// never evicted.
    fn evict(&self, keep: Option<&str>) {
        let mut index = self.lock();
        while index.total > self.capacity {
            let victim = index
                .entries
                .iter()
                .filter(|(name, _)| Some(name.as_str()) != keep)
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(name, _)| name.clone());
            let Some(name) = victim else {
                break;
            };
            index.remove(&name);
            match fs::remove_file(self.directory.join(&name)) {
                Ok(()) => debug!(entry = %name, "Evicted cache entry"),
                Err(e) => warn!(entry = %name, error = %e, "Failed to evict cache entry"),
            }
        }
    }
}

impl DiskCache for FileCache {
    fn exists(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_file()
    }

    fn open(&self, key: &CacheKey) -> Option<File> {
        let file = File::open(self.path_for(key)).ok()?;
        self.lock().touch(&key.file_name());
        Some(file)
    }

    fn create_file_for(&self, key: &CacheKey) -> Result<PendingFile, CacheError> {
        let file = tempfile::Builder::new()
            .prefix(PENDING_PREFIX)
            .suffix(ENTRY_SUFFIX)
            .tempfile_in(&self.directory)?;
        Ok(PendingFile::new(key.clone(), file))
    }

    fn finalize(&self, file: PendingFile) -> Result<(), CacheError> {
        let (key, temp) = file.into_parts();
        let name = key.file_name();
        let size = temp.as_file().metadata()?.len();
        temp.persist(self.directory.join(&name)).map_err(|e| CacheError::Io(e.error))?;
        self.lock().insert(name.clone(), size);
        debug!(key = %key, bytes = size, "Cache entry written");
        self.evict(Some(&name));
        Ok(())
    }
}
