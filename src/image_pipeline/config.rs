//! Pipeline configuration types

use crate::image_pipeline::cache::key::FORMAT_VERSION;
use crate::image_pipeline::debayer::DemosaicQuality;
use crate::image_pipeline::tiff::CacheCompression;

/// Default tile edge, in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Configuration for RAW conversion
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tile_width: u32,
    pub tile_height: u32,
    /// Threads used to populate tiles
    pub workers: usize,
    /// Whether decoded rasters are looked up in and written to the disk cache
    pub cache_conversion: bool,
    /// Folded into every cache key; bump to invalidate old entries
    pub format_version: u32,
    pub demosaic: DemosaicQuality,
    /// Compression of disk cache entries
    pub cache_compression: CacheCompression,
    /// Whether to reject decoded rasters with a zero width or height
    pub validate_dimensions: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            workers: default_workers(),
            cache_conversion: true,
            format_version: FORMAT_VERSION,
            demosaic: DemosaicQuality::default(),
            cache_compression: CacheCompression::default(),
            validate_dimensions: true,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for PipelineConfig
#[derive(Default)]
pub struct PipelineConfigBuilder {
    tile_width: Option<u32>,
    tile_height: Option<u32>,
    workers: Option<usize>,
    cache_conversion: Option<bool>,
    format_version: Option<u32>,
    demosaic: Option<DemosaicQuality>,
    cache_compression: Option<CacheCompression>,
    validate_dimensions: Option<bool>,
}

impl PipelineConfigBuilder {
    pub fn tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = Some(width);
        self.tile_height = Some(height);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn cache_conversion(mut self, enable: bool) -> Self {
        self.cache_conversion = Some(enable);
        self
    }

    pub fn format_version(mut self, version: u32) -> Self {
        self.format_version = Some(version);
        self
    }

    pub fn demosaic(mut self, quality: DemosaicQuality) -> Self {
        self.demosaic = Some(quality);
        self
    }

    pub fn cache_compression(mut self, compression: CacheCompression) -> Self {
        self.cache_compression = Some(compression);
        self
    }

    pub fn validate_dimensions(mut self, validate: bool) -> Self {
        self.validate_dimensions = Some(validate);
        self
    }

    pub fn build(self) -> PipelineConfig {
        let default = PipelineConfig::default();
        PipelineConfig {
            tile_width: self.tile_width.unwrap_or(default.tile_width).max(1),
            tile_height: self.tile_height.unwrap_or(default.tile_height).max(1),
            workers: self.workers.unwrap_or(default.workers).max(1),
            cache_conversion: self.cache_conversion.unwrap_or(default.cache_conversion),
            format_version: self.format_version.unwrap_or(default.format_version),
            demosaic: self.demosaic.unwrap_or(default.demosaic),
            cache_compression: self.cache_compression.unwrap_or(default.cache_compression),
            validate_dimensions: self.validate_dimensions.unwrap_or(default.validate_dimensions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!((config.tile_width, config.tile_height), (512, 512));
        assert!(config.workers >= 1);
        assert!(config.cache_conversion);
        assert_eq!(config.format_version, 5);
        assert_eq!(config.demosaic, DemosaicQuality::EdgeDirected);
        assert_eq!(config.cache_compression, CacheCompression::DeflateFast);
    }

    #[test]
    fn test_builder_overrides() {
        let config = PipelineConfig::builder()
            .tile_size(64, 32)
            .workers(0)
            .cache_conversion(false)
            .demosaic(DemosaicQuality::Linear)
            .build();
        assert_eq!((config.tile_width, config.tile_height), (64, 32));
        assert_eq!(config.workers, 1);
        assert!(!config.cache_conversion);
        assert_eq!(config.demosaic, DemosaicQuality::Linear);
        assert!(config.validate_dimensions);
    }
}
