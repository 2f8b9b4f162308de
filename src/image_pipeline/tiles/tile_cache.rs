//! Tile storage shared by every tiled image in the process.
//!
//! [`MemoryTileCache`] keeps tiles in memory up to a byte budget. Past that,
//! the least recently used tiles nobody is holding are written to a swap
//! directory and read back the next time they are asked for.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::image_pipeline::common::raster::{Raster, Rect};

/// Process-unique identity of a tiled image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

impl ImageId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ImageId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A tile, shared between the cache and whoever is reading or writing it.
pub type SharedTile = Arc<Mutex<Raster>>;

pub trait TileCache: Send + Sync {
    fn get(&self, image: ImageId, tile_x: u32, tile_y: u32) -> Option<SharedTile>;
    fn add(&self, image: ImageId, tile_x: u32, tile_y: u32, tile: SharedTile);
    fn remove_tiles(&self, image: ImageId);
}

/// Configuration for [`MemoryTileCache`].
#[derive(Debug, Clone)]
pub struct TileCacheConfig {
    /// Bytes of tile data kept in memory before spilling.
    pub memory_capacity: usize,
    /// Parent of the swap directory; the system temp dir when `None`.
    pub swap_dir: Option<PathBuf>,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 256 * 1024 * 1024,
            swap_dir: None,
        }
    }
}

type TileKey = (ImageId, u32, u32);

struct Resident {
    tile: SharedTile,
    bytes: usize,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    resident: HashMap<TileKey, Resident>,
    swapped: HashMap<TileKey, PathBuf>,
    resident_bytes: usize,
    clock: u64,
    tiles_written: u64,
    tiles_read: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

pub struct MemoryTileCache {
    state: Mutex<CacheState>,
    capacity: usize,
    swap: Option<TempDir>,
}

fn tile_bytes(tile: &Raster) -> usize {
    tile.data().len() * std::mem::size_of::<u16>()
}

fn write_tile(path: &PathBuf, tile: &Raster) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let b = tile.bounds();
    out.write_all(&b.x.to_le_bytes())?;
    out.write_all(&b.y.to_le_bytes())?;
    out.write_all(&b.width.to_le_bytes())?;
    out.write_all(&b.height.to_le_bytes())?;
    out.write_all(&(tile.bands() as u32).to_le_bytes())?;
    for v in tile.data() {
        out.write_all(&v.to_le_bytes())?;
    }
    out.flush()
}

fn read_tile(path: &PathBuf) -> io::Result<Raster> {
    let mut input = BufReader::new(File::open(path)?);
    let mut word = [0u8; 4];
    let mut next = |input: &mut BufReader<File>| -> io::Result<[u8; 4]> {
        input.read_exact(&mut word)?;
        Ok(word)
    };
    let x = i32::from_le_bytes(next(&mut input)?);
    let y = i32::from_le_bytes(next(&mut input)?);
    let width = u32::from_le_bytes(next(&mut input)?);
    let height = u32::from_le_bytes(next(&mut input)?);
    let bands = u32::from_le_bytes(next(&mut input)?) as usize;

    let bounds = Rect::new(x, y, width, height);
    let mut bytes = vec![0u8; bounds.area() * bands * 2];
    input.read_exact(&mut bytes)?;
    let data = bytes.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();
    Raster::from_data(bounds, bands, data)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "corrupt swapped tile"))
}

impl MemoryTileCache {
    pub fn new(config: TileCacheConfig) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("darkroom-tiles-");
        let swap = match &config.swap_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };
        debug!(swap = %swap.path().display(), capacity = config.memory_capacity, "Tile cache ready");
        Ok(Self {
            state: Mutex::new(CacheState::default()),
            capacity: config.memory_capacity,
            swap: Some(swap),
        })
    }

    /// A cache that never spills.
    pub fn unbounded() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity: usize::MAX,
            swap: None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tiles spilled to disk so far.
    pub fn tiles_written(&self) -> u64 {
        self.lock().tiles_written
    }

    /// Tiles read back from disk so far.
    pub fn tiles_read(&self) -> u64 {
        self.lock().tiles_read
    }

    pub fn resident_bytes(&self) -> usize {
        self.lock().resident_bytes
    }

    /// Spills idle tiles, oldest first, until the budget holds or nothing
    /// else can go.
    fn evict(&self, state: &mut CacheState) {
        let Some(swap) = &self.swap else {
            return;
        };
        while state.resident_bytes > self.capacity {
            let victim = state
                .resident
                .iter()
                .filter(|(_, r)| Arc::strong_count(&r.tile) == 1)
                .min_by_key(|(_, r)| r.last_used)
                .map(|(key, _)| *key);
            let Some(key) = victim else {
                break;
            };
            let path = swap.path().join(format!("{}-{}-{}.tile", key.0 .0, key.1, key.2));
            let written = {
                let resident = &state.resident[&key];
                let tile = resident.tile.lock().unwrap_or_else(PoisonError::into_inner);
                write_tile(&path, &tile)
            };
            if let Err(e) = written {
                warn!(error = %e, "Failed to swap tile out, keeping it in memory");
                break;
            }
            if let Some(resident) = state.resident.remove(&key) {
                state.resident_bytes -= resident.bytes;
            }
            state.swapped.insert(key, path);
            state.tiles_written += 1;
        }
    }

    fn insert(&self, state: &mut CacheState, key: TileKey, tile: SharedTile) {
        let bytes = tile_bytes(&tile.lock().unwrap_or_else(PoisonError::into_inner));
        let last_used = state.tick();
        if let Some(old) = state.resident.insert(key, Resident { tile, bytes, last_used }) {
            state.resident_bytes -= old.bytes;
        }
        state.resident_bytes += bytes;
    }
}

impl TileCache for MemoryTileCache {
    fn get(&self, image: ImageId, tile_x: u32, tile_y: u32) -> Option<SharedTile> {
        let key = (image, tile_x, tile_y);
        let mut state = self.lock();

        let now = state.tick();
        if let Some(resident) = state.resident.get_mut(&key) {
            resident.last_used = now;
            return Some(Arc::clone(&resident.tile));
        }

        let path = state.swapped.remove(&key)?;
        let tile = match read_tile(&path) {
            Ok(tile) => tile,
            Err(e) => {
                warn!(error = %e, tile_x, tile_y, "Lost swapped tile");
                return None;
            }
        };
        let _ = std::fs::remove_file(&path);
        state.tiles_read += 1;

        let shared = Arc::new(Mutex::new(tile));
        self.insert(&mut state, key, Arc::clone(&shared));
        self.evict(&mut state);
        Some(shared)
    }

    fn add(&self, image: ImageId, tile_x: u32, tile_y: u32, tile: SharedTile) {
        let key = (image, tile_x, tile_y);
        let mut state = self.lock();
        if let Some(path) = state.swapped.remove(&key) {
            let _ = std::fs::remove_file(path);
        }
        self.insert(&mut state, key, tile);
        self.evict(&mut state);
    }

    fn remove_tiles(&self, image: ImageId) {
        let mut state = self.lock();
        let mut freed = 0;
        state.resident.retain(|key, resident| {
            let keep = key.0 != image;
            if !keep {
                freed += resident.bytes;
            }
            keep
        });
        state.resident_bytes -= freed;
        state.swapped.retain(|key, path| {
            let keep = key.0 != image;
            if !keep {
                let _ = std::fs::remove_file(path);
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(value: u16) -> SharedTile {
        let bounds = Rect::new(0, 0, 16, 16);
        Arc::new(Mutex::new(Raster::from_data(bounds, 3, vec![value; bounds.area() * 3]).unwrap()))
    }

    #[test]
    fn test_add_and_get() {
        let cache = MemoryTileCache::unbounded();
        let id = ImageId::next();
        cache.add(id, 1, 2, tile(9));
        let got = cache.get(id, 1, 2).unwrap();
        assert_eq!(got.lock().unwrap().get(0, 0, 0), 9);
        assert!(cache.get(id, 2, 1).is_none());
        assert!(cache.get(ImageId::next(), 1, 2).is_none());
    }

    #[test]
    fn test_spills_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let one_tile = 16 * 16 * 3 * 2;
        let cache = MemoryTileCache::new(TileCacheConfig {
            memory_capacity: one_tile,
            swap_dir: Some(dir.path().to_path_buf()),
        })
        .unwrap();
        let id = ImageId::next();

        cache.add(id, 0, 0, tile(1));
        cache.add(id, 1, 0, tile(2));
        assert_eq!(cache.tiles_written(), 1);
        assert!(cache.resident_bytes() <= one_tile);

        let back = cache.get(id, 0, 0).unwrap();
        assert_eq!(back.lock().unwrap().get(5, 5, 2), 1);
        assert_eq!(cache.tiles_read(), 1);
        // Reading it back pushed the other tile out.
        assert_eq!(cache.tiles_written(), 2);
    }

    #[test]
    fn test_held_tiles_are_not_evicted() {
        let cache = MemoryTileCache::new(TileCacheConfig {
            memory_capacity: 1,
            swap_dir: None,
        })
        .unwrap();
        let id = ImageId::next();
        let held = tile(3);
        cache.add(id, 0, 0, Arc::clone(&held));
        assert_eq!(cache.tiles_written(), 0);
        drop(held);
        cache.add(id, 1, 0, tile(4));
        assert_eq!(cache.tiles_written(), 2);
    }

    #[test]
    fn test_remove_tiles() {
        let cache = MemoryTileCache::unbounded();
        let (a, b) = (ImageId::next(), ImageId::next());
        cache.add(a, 0, 0, tile(1));
        cache.add(b, 0, 0, tile(2));
        cache.remove_tiles(a);
        assert!(cache.get(a, 0, 0).is_none());
        assert!(cache.get(b, 0, 0).is_some());
    }
}
