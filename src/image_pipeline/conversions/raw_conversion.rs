use std::io::BufReader;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};

use crate::image_pipeline::{
    cache::{CacheKey, DiskCache},
    common::{
        error::{CacheError, PipelineError, Result},
        progress::ProgressHandle,
        raster::Raster,
    },
    config::PipelineConfig,
    conversions::{context::PipelineContext, timing::PipelineTimings},
    debayer,
    geometry,
    raw::{DecodedRaster, FormatFamily, ImageSource, RawDecoder, RawLoaderDecoder},
    tiff::read_tiled_image,
    tiles::TiledImage,
};

/// Turns a described RAW file into a tiled linear RGB image, going through
/// the disk cache when it can.
///
/// One pipeline exists per format family. Conversions on the same pipeline
/// are serialized for their whole duration; different families run side by
/// side.
pub struct RawConversionPipeline {
    family: FormatFamily,
    decoder: Arc<dyn RawDecoder>,
    context: PipelineContext,
    config: PipelineConfig,
    decode_lock: Mutex<()>,
}

impl RawConversionPipeline {
    pub fn new(family: FormatFamily, context: PipelineContext, config: PipelineConfig) -> Self {
        Self::with_custom(family, Arc::new(RawLoaderDecoder::new()), context, config)
    }

    pub fn with_custom(
        family: FormatFamily,
        decoder: Arc<dyn RawDecoder>,
        context: PipelineContext,
        config: PipelineConfig,
    ) -> Self {
        Self {
            family,
            decoder,
            context,
            config,
            decode_lock: Mutex::new(()),
        }
    }

    pub fn family(&self) -> FormatFamily {
        self.family
    }

    pub fn decoder(&self) -> &Arc<dyn RawDecoder> {
        &self.decoder
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Converts `source`. `Ok(None)` means the caller cancelled.
    pub fn convert(&self, source: &ImageSource, progress: &ProgressHandle) -> Result<Option<Arc<TiledImage>>> {
        self.convert_with_timings(source, progress).map(|(image, _)| image)
    }

    #[instrument(skip(self, source, progress), fields(family = %self.family, file = %source.file_name()))]
    pub fn convert_with_timings(
        &self,
        source: &ImageSource,
        progress: &ProgressHandle,
    ) -> Result<(Option<Arc<TiledImage>>, PipelineTimings)> {
        let _serialized = self.decode_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut timings = PipelineTimings::new();

        self.validate_source(source)?;

        let key = self.cache_key(source);

        if let (Some(key), Some(disk)) = (&key, &self.context.disk_cache) {
            let _span = tracing::info_span!("cache_lookup").entered();
            let hit = timings.time("cache_lookup", || self.load_cached(disk.as_ref(), key));
            match hit {
                Ok(Some(image)) => {
                    self.decoder.release(&source.path);
                    info!(key = %key, "Retrieved cached image");
                    return Ok((Some(Arc::new(image)), timings));
                }
                Ok(None) => debug!(key = %key, "File not in cache"),
                Err(e) => warn!(key = %key, error = %e, "Unreadable cache entry, decoding instead"),
            }
        }

        progress.set_range(0, 3);

        let decoded = {
            let _span = tracing::info_span!("decode_raw").entered();
            timings.time("decode_raw", || self.decoder.decode(source, progress))?
        };

        if progress.is_cancelled() {
            info!("Conversion cancelled after decode");
            return Ok((None, timings));
        }
        progress.increment_by(1);

        self.validate_dimensions(&decoded.raster)?;

        let developed = self.develop(source, decoded, &mut timings)?;

        let image = {
            let _span = tracing::info_span!(
                "tiling",
                width = developed.width(),
                height = developed.height()
            )
            .entered();
            timings.time("tiling", || {
                let image = TiledImage::new(
                    developed.bounds(),
                    developed.bands(),
                    self.config.tile_width,
                    self.config.tile_height,
                    Arc::clone(&self.context.tile_cache),
                );
                self.populate(&image, &developed);
                Arc::new(image)
            })
        };
        progress.increment_by(1);

        if let (Some(key), Some(persister)) = (key, &self.context.persister) {
            persister.submit(key, Arc::clone(&image));
        }
        progress.increment_by(1);

        info!(
            width = image.width(),
            height = image.height(),
            "Conversion complete in {:.3}ms",
            timings.total_duration().as_secs_f64() * 1000.0
        );
        Ok((Some(image), timings))
    }

    fn validate_source(&self, source: &ImageSource) -> Result<()> {
        if !source.decodable || source.raw_colors != 3 {
            return Err(PipelineError::UnsupportedSource(format!(
                "{} {} ({} raw colours)",
                source.make, source.model, source.raw_colors
            )));
        }
        Ok(())
    }

    /// Cache key for `source`, when caching applies to it at all.
    fn cache_key(&self, source: &ImageSource) -> Option<CacheKey> {
        if !self.config.cache_conversion || self.context.disk_cache.is_none() {
            return None;
        }
        let key = CacheKey::for_source(source, self.config.format_version);
        if key.is_none() {
            debug!("No capture time, not caching this conversion");
        }
        key
    }

    fn load_cached(&self, disk: &dyn DiskCache, key: &CacheKey) -> std::result::Result<Option<TiledImage>, CacheError> {
        if !disk.exists(key) {
            return Ok(None);
        }
        let Some(file) = disk.open(key) else {
            return Ok(None);
        };
        let image = read_tiled_image(
            BufReader::new(file),
            Some(key.as_str()),
            Arc::clone(&self.context.tile_cache),
            self.config.tile_width,
            self.config.tile_height,
        )?;
        Ok(Some(image))
    }

    fn validate_dimensions(&self, raster: &Raster) -> Result<()> {
        if !self.config.validate_dimensions {
            return Ok(());
        }

        if raster.width() == 0 || raster.height() == 0 {
            return Err(PipelineError::DecodeFailure(format!(
                "invalid dimensions {}x{}",
                raster.width(),
                raster.height()
            )));
        }

        Ok(())
    }

    /// Demosaic and geometry correction, or pass-through for rasters that
    /// need neither. The result starts at the origin.
    fn develop(&self, source: &ImageSource, decoded: DecodedRaster, timings: &mut PipelineTimings) -> Result<Raster> {
        let DecodedRaster { raster, bits_per_sample } = decoded;

        let developed = match raster.bands() {
            1 if source.is_mosaiced() => {
                let pattern = source.filter_pattern().ok_or_else(|| {
                    PipelineError::DecodeFailure(format!("unsupported filter pattern {:#010x}", source.filters))
                })?;

                let rgb = {
                    let _span = tracing::info_span!("demosaic", ?pattern).entered();
                    timings.time("demosaic", || {
                        debayer::demosaic(&raster, pattern, self.config.demosaic, bits_per_sample)
                    })?
                };
                drop(raster);

                let _span = tracing::info_span!("geometry").entered();
                timings.time("geometry", || geometry::correct_geometry(&rgb, self.family, source))
            }
            1 => raster.expand_bands(3),
            3 => raster,
            bands => {
                return Err(PipelineError::DecodeFailure(format!("unexpected {} band raster", bands)));
            }
        };

        if developed.bounds().is_empty() {
            return Err(PipelineError::DecodeFailure(format!(
                "{}x{} raster is too small to develop",
                source.raw_width, source.raw_height
            )));
        }
        Ok(developed.into_origin())
    }

    /// Copies `src` into every tile of `image`, each worker owning a
    /// contiguous run of tile indices. Returns once all are done.
    fn populate(&self, image: &TiledImage, src: &Raster) {
        let indices = image.all_tile_indices();
        let partitions = self.config.workers.max(1);
        let chunk = indices.len().div_ceil(partitions).max(1);
        debug!(tiles = indices.len(), partitions, "Populating tiles");

        self.context.workers.scope(|scope| {
            for part in indices.chunks(chunk) {
                scope.spawn(move |_| {
                    for &(tx, ty) in part {
                        image.copy_tile_from(tx, ty, src);
                    }
                });
            }
        });
    }
}
