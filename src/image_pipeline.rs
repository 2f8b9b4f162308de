//! Image processing pipeline module
//!
//! RAW files go through format resolution, decoding, demosaicing and
//! geometry correction before landing in a tiled image backed by the tile
//! cache. Decoded results are kept in an on-disk TIFF cache so a second
//! open of the same file skips all of that.

pub mod cache;
pub mod common;
pub mod config;
pub mod conversions;
pub mod debayer;
pub mod formats;
pub mod geometry;
pub mod raw;
pub mod tiff;
pub mod tiles;

pub use common::{CacheError, PipelineError, ProgressHandle, Raster, Rect, Result};

pub use config::{PipelineConfig, PipelineConfigBuilder};

pub use raw::{FilterPattern, FormatFamily, ImageSource, RawDecoder, RawLoaderDecoder};

pub use cache::{CacheKey, FileCache, FileCacheConfig};

pub use conversions::{PipelineContext, PipelineTimings, RawConversionPipeline};

pub use debayer::DemosaicQuality;

pub use formats::{FormatHandlers, FormatResolver};

pub use tiff::CacheCompression;

pub use tiles::{MemoryTileCache, TileCacheConfig, TiledImage};
