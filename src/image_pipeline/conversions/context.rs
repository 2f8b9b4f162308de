//! Collaborators shared by every format pipeline.

use std::sync::Arc;

use tracing::{info, warn};

use crate::image_pipeline::cache::{BackgroundCachePersister, DiskCache, FileCache, FileCacheConfig};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::config::PipelineConfig;
use crate::image_pipeline::tiles::{MemoryTileCache, TileCache, TileCacheConfig};

/// Tile cache, disk cache, background writer and worker pool. Cheap to clone.
#[derive(Clone)]
pub struct PipelineContext {
    pub tile_cache: Arc<dyn TileCache>,
    /// `None` runs every conversion without a disk cache.
    pub disk_cache: Option<Arc<dyn DiskCache>>,
    pub persister: Option<Arc<BackgroundCachePersister>>,
    pub workers: Arc<rayon::ThreadPool>,
}

fn worker_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("tile-worker-{}", i))
        .build()
        .map_err(|e| PipelineError::Setup(format!("tile worker pool: {}", e)))
}

impl PipelineContext {
    /// Wires explicit collaborators together. A persister is started when a
    /// disk cache is given.
    pub fn new(
        tile_cache: Arc<dyn TileCache>,
        disk_cache: Option<Arc<dyn DiskCache>>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let persister = match &disk_cache {
            Some(disk) => Some(Arc::new(BackgroundCachePersister::new(
                Arc::clone(disk),
                config.cache_compression,
            )?)),
            None => None,
        };
        Ok(Self {
            tile_cache,
            disk_cache,
            persister,
            workers: Arc::new(worker_pool(config.workers)?),
        })
    }

    /// Default collaborators. A cache that cannot be opened is logged and
    /// left out rather than failing construction.
    pub fn with_defaults(
        config: &PipelineConfig,
        file_cache: FileCacheConfig,
        tile_cache: TileCacheConfig,
    ) -> Result<Self> {
        let tiles: Arc<dyn TileCache> = match MemoryTileCache::new(tile_cache) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                warn!(error = %e, "No tile swap directory, tiles stay in memory");
                Arc::new(MemoryTileCache::unbounded())
            }
        };

        let disk: Option<Arc<dyn DiskCache>> = if config.cache_conversion {
            match FileCache::new(file_cache) {
                Ok(cache) => {
                    info!(dir = %cache.directory().display(), "Using RAW file cache");
                    Some(Arc::new(cache))
                }
                Err(e) => {
                    warn!(error = %e, "RAW file cache unavailable, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        Self::new(tiles, disk, config)
    }

    /// Blocks until queued cache writes are done.
    pub fn flush(&self) {
        if let Some(persister) = &self.persister {
            persister.wait_idle();
        }
    }
}
