//! Tiled images and the tile cache behind them.

pub mod tile_cache;
pub mod tiled_image;

pub use tile_cache::{ImageId, MemoryTileCache, SharedTile, TileCache, TileCacheConfig};
pub use tiled_image::TiledImage;
