//! Tile-addressable raster backed by a [`TileCache`].

use std::sync::{Arc, Mutex, PoisonError};

use crate::image_pipeline::common::raster::{Raster, Rect};
use crate::image_pipeline::tiles::tile_cache::{ImageId, SharedTile, TileCache};

/// A raster split into fixed-size tiles that live in a shared tile cache.
///
/// Tiles are allocated on first write. Each tile slot has its own lock, so
/// two writers racing for the same empty slot end up with one tile while
/// writers on different slots never wait for each other. Edge tiles are
/// clipped to the image bounds.
pub struct TiledImage {
    id: ImageId,
    bounds: Rect,
    bands: usize,
    tile_width: u32,
    tile_height: u32,
    cache: Arc<dyn TileCache>,
    slots: Vec<Mutex<()>>,
}

impl std::fmt::Debug for TiledImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiledImage")
            .field("id", &self.id)
            .field("bounds", &self.bounds)
            .field("bands", &self.bands)
            .field("tile_width", &self.tile_width)
            .field("tile_height", &self.tile_height)
            .finish()
    }
}

impl TiledImage {
    pub fn new(bounds: Rect, bands: usize, tile_width: u32, tile_height: u32, cache: Arc<dyn TileCache>) -> Self {
        let tile_width = tile_width.max(1);
        let tile_height = tile_height.max(1);
        let count = bounds.width.div_ceil(tile_width) as usize * bounds.height.div_ceil(tile_height) as usize;
        Self {
            id: ImageId::next(),
            bounds,
            bands,
            tile_width,
            tile_height,
            cache,
            slots: (0..count).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn width(&self) -> u32 {
        self.bounds.width
    }

    pub fn height(&self) -> u32 {
        self.bounds.height
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn num_tiles_x(&self) -> u32 {
        self.bounds.width.div_ceil(self.tile_width)
    }

    pub fn num_tiles_y(&self) -> u32 {
        self.bounds.height.div_ceil(self.tile_height)
    }

    pub fn num_tiles(&self) -> usize {
        self.slots.len()
    }

    /// Pixel area of tile `(tile_x, tile_y)`, clipped to the image.
    pub fn tile_rect(&self, tile_x: u32, tile_y: u32) -> Rect {
        let full = Rect::new(
            self.bounds.x + (tile_x * self.tile_width) as i32,
            self.bounds.y + (tile_y * self.tile_height) as i32,
            self.tile_width,
            self.tile_height,
        );
        full.intersection(&self.bounds)
            .unwrap_or(Rect::new(full.x, full.y, 0, 0))
    }

    /// Tiles intersecting `rect`, row-major.
    pub fn tile_indices(&self, rect: Rect) -> Vec<(u32, u32)> {
        let Some(area) = rect.intersection(&self.bounds) else {
            return Vec::new();
        };
        let x0 = (area.x - self.bounds.x) as u32 / self.tile_width;
        let y0 = (area.y - self.bounds.y) as u32 / self.tile_height;
        let x1 = (area.right() - 1 - self.bounds.x) as u32 / self.tile_width;
        let y1 = (area.bottom() - 1 - self.bounds.y) as u32 / self.tile_height;
        (y0..=y1)
            .flat_map(|ty| (x0..=x1).map(move |tx| (tx, ty)))
            .collect()
    }

    /// All tile indices, row-major.
    pub fn all_tile_indices(&self) -> Vec<(u32, u32)> {
        self.tile_indices(self.bounds)
    }

    fn slot(&self, tile_x: u32, tile_y: u32) -> &Mutex<()> {
        &self.slots[(tile_y * self.num_tiles_x() + tile_x) as usize]
    }

    /// The tile if it has been materialized.
    pub fn get_tile(&self, tile_x: u32, tile_y: u32) -> Option<SharedTile> {
        self.cache.get(self.id, tile_x, tile_y)
    }

    /// The tile at `(tile_x, tile_y)`, allocating and registering a zeroed
    /// one if none exists yet.
    pub fn get_writable_tile(&self, tile_x: u32, tile_y: u32) -> SharedTile {
        let _slot = self.slot(tile_x, tile_y).lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tile) = self.cache.get(self.id, tile_x, tile_y) {
            return tile;
        }
        let tile = Arc::new(Mutex::new(Raster::new(self.tile_rect(tile_x, tile_y), self.bands)));
        self.cache.add(self.id, tile_x, tile_y, Arc::clone(&tile));
        tile
    }

    /// Copies the part of `src` inside tile `(tile_x, tile_y)` into it.
    pub fn copy_tile_from(&self, tile_x: u32, tile_y: u32, src: &Raster) {
        let tile = self.get_writable_tile(tile_x, tile_y);
        tile.lock().unwrap_or_else(PoisonError::into_inner).copy_from(src);
    }

    /// Copies the overlap of `src` into every tile it touches. Tiles outside
    /// `src` are left alone.
    pub fn set_data(&self, src: &Raster) {
        for (tx, ty) in self.tile_indices(src.bounds()) {
            self.copy_tile_from(tx, ty, src);
        }
    }

    /// Copies `rect` out of the image. Unmaterialized tiles read as zero.
    pub fn get_data(&self, rect: Rect) -> Raster {
        let mut out = Raster::new(rect, self.bands);
        for (tx, ty) in self.tile_indices(rect) {
            if let Some(tile) = self.get_tile(tx, ty) {
                out.copy_from(&tile.lock().unwrap_or_else(PoisonError::into_inner));
            }
        }
        out
    }

    pub fn to_raster(&self) -> Raster {
        self.get_data(self.bounds)
    }
}

impl Drop for TiledImage {
    fn drop(&mut self) {
        self.cache.remove_tiles(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::tiles::tile_cache::MemoryTileCache;

    fn image(width: u32, height: u32, tile: u32) -> (Arc<MemoryTileCache>, TiledImage) {
        let cache = Arc::new(MemoryTileCache::unbounded());
        let img = TiledImage::new(Rect::new(0, 0, width, height), 3, tile, tile, cache.clone());
        (cache, img)
    }

    fn ramp(bounds: Rect) -> Raster {
        let data = (0..bounds.area() * 3).map(|i| (i % 60000) as u16).collect();
        Raster::from_data(bounds, 3, data).unwrap()
    }

    #[test]
    fn test_tile_grid() {
        let (_, img) = image(100, 70, 32);
        assert_eq!((img.num_tiles_x(), img.num_tiles_y()), (4, 3));
        assert_eq!(img.tile_rect(3, 2), Rect::new(96, 64, 4, 6));
        assert_eq!(img.tile_indices(Rect::new(30, 30, 4, 4)), vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert!(img.tile_indices(Rect::new(200, 0, 5, 5)).is_empty());
    }

    #[test]
    fn test_set_data_covers_every_pixel() {
        let (_, img) = image(100, 70, 32);
        let src = ramp(img.bounds());
        img.set_data(&src);
        assert_eq!(img.to_raster(), src);
    }

    #[test]
    fn test_set_data_leaves_other_tiles_alone() {
        let (_, img) = image(64, 64, 32);
        let base = ramp(img.bounds());
        img.set_data(&base);

        let patch = Raster::from_data(Rect::new(2, 3, 10, 10), 3, vec![9; 300]).unwrap();
        img.set_data(&patch);

        let out = img.to_raster();
        for y in 0..64 {
            for x in 0..64 {
                let expected = if patch.bounds().contains(x, y) { 9 } else { base.get(x, y, 0) };
                assert_eq!(out.get(x, y, 0), expected, "({}, {})", x, y);
            }
        }
        // Tiles the patch does not touch are bit-identical to before.
        for (tx, ty) in [(1, 0), (0, 1), (1, 1)] {
            let rect = img.tile_rect(tx, ty);
            assert_eq!(img.get_data(rect), base.crop(rect).unwrap());
        }
    }

    #[test]
    fn test_set_data_materializes_only_touched_tiles() {
        let (_, img) = image(64, 64, 32);
        let patch = Raster::from_data(Rect::new(0, 0, 10, 10), 3, vec![9; 300]).unwrap();
        img.set_data(&patch);
        assert!(img.get_tile(0, 0).is_some());
        assert!(img.get_tile(1, 0).is_none());
        assert!(img.get_tile(1, 1).is_none());
        let out = img.get_data(Rect::new(0, 0, 12, 12));
        assert_eq!(out.get(9, 9, 0), 9);
        assert_eq!(out.get(10, 10, 0), 0);
    }

    #[test]
    fn test_writable_tile_is_allocated_once() {
        let (_, img) = image(64, 64, 32);
        let a = img.get_writable_tile(1, 1);
        let b = img.get_writable_tile(1, 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_concurrent_writers_share_slot() {
        let (_, img) = image(64, 64, 32);
        let tiles: Vec<SharedTile> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| img.get_writable_tile(0, 0))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(tiles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_drop_removes_tiles() {
        let (cache, img) = image(64, 64, 32);
        let id = img.id();
        img.get_writable_tile(0, 0);
        drop(img);
        assert!(cache.get(id, 0, 0).is_none());
    }
}
