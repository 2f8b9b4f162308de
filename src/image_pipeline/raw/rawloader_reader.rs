//! RAW decoder implementation using the rawloader library.
//!
//! Supports every format rawloader can decode (ARW, CR2, NEF, DNG, RAF, ORF,
//! RW2, ...). `describe` asks rawloader for a metadata-only pass, which skips
//! the pixel decode. Some decoders cannot do that; for those `describe` falls
//! back to a full decode and hands the image to the following `decode` of
//! the same path, or drops it on `release`.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::UNIX_EPOCH;

use rawloader::{RawImage, RawImageData as RawloaderImageData, RawLoader};
use tracing::debug;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::progress::ProgressHandle;
use crate::image_pipeline::common::raster::{Raster, Rect};
use crate::image_pipeline::raw::reader::RawDecoder;
use crate::image_pipeline::raw::types::{
    DecodedRaster, FilterPattern, ImageSource, FILTERS_NONE, FILTERS_NON_BAYER,
};

/// Default bit depth when no white level information is available from the RAW file.
const DEFAULT_BITS_PER_SAMPLE: u32 = 16;

/// The bit width of the u16 data type, used for calculating actual bits per sample.
const U16_BITS: u32 = 16;

/// [`RawDecoder`] backed by rawloader.
pub struct RawLoaderDecoder {
    loader: RawLoader,
    last: Mutex<Option<(PathBuf, RawImage)>>,
    pixel_decodes: AtomicUsize,
}

impl Default for RawLoaderDecoder {
    fn default() -> Self {
        Self {
            loader: RawLoader::new(),
            last: Mutex::new(None),
            pixel_decodes: AtomicUsize::new(0),
        }
    }
}

impl RawLoaderDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full pixel decodes performed so far.
    pub fn pixel_decodes(&self) -> usize {
        self.pixel_decodes.load(Ordering::Relaxed)
    }

    fn decode_failure(path: &Path, e: impl std::fmt::Display) -> PipelineError {
        PipelineError::DecodeFailure(format!("{}: {}", path.display(), e))
    }

    fn take_kept(&self, path: &Path) -> Option<RawImage> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_if(|(p, _)| p.as_path() == path)
            .map(|(_, image)| image)
    }

    fn load_pixels(&self, path: &Path) -> Result<RawImage> {
        if let Some(image) = self.take_kept(path) {
            debug!(path = %path.display(), "Reusing image decoded by describe");
            return Ok(image);
        }
        debug!(path = %path.display(), "Decoding RAW file");
        self.pixel_decodes.fetch_add(1, Ordering::Relaxed);
        self.loader
            .decode_file(path)
            .map_err(|e| Self::decode_failure(path, e))
    }

    /// Header and camera data without the sensor pixels.
    fn load_metadata(&self, path: &Path) -> Result<RawImage> {
        let mut reader = BufReader::new(File::open(path).map_err(|e| Self::decode_failure(path, e))?);
        self.loader
            .decode(&mut reader, true)
            .map_err(|e| Self::decode_failure(path, e))
    }

    fn keep(&self, path: &Path, image: RawImage) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some((path.to_path_buf(), image));
    }
}

/// Minimum bits needed to represent the sensor's white level,
/// e.g. 4095 -> 12 bits, 16383 -> 14 bits.
fn bits_per_sample(whitelevels: &[u16]) -> u32 {
    let max_white_level = whitelevels.iter().max().copied().unwrap_or(u16::MAX);
    if max_white_level == 0 {
        DEFAULT_BITS_PER_SAMPLE
    } else {
        U16_BITS - max_white_level.leading_zeros()
    }
}

/// Filter code and colour count for a rawloader CFA name.
fn classify_cfa(cpp: usize, cfa_name: &str) -> (u32, u32) {
    if cpp == 3 {
        return (FILTERS_NONE, 3);
    }
    let colors = cfa_name.chars().collect::<BTreeSet<_>>().len() as u32;
    match FilterPattern::from_name(cfa_name) {
        Some(pattern) => (pattern.filters(), colors),
        None if cfa_name.is_empty() => (FILTERS_NONE, 1),
        None => (FILTERS_NON_BAYER, colors),
    }
}

fn modified_millis(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since = modified.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since.as_millis()).ok()
}

impl RawDecoder for RawLoaderDecoder {
    fn describe(&self, path: &Path) -> Result<ImageSource> {
        let (image, full) = match self.load_metadata(path) {
            Ok(image) => (image, false),
            Err(e) => {
                debug!(error = %e, "Metadata-only read failed, decoding pixels");
                (self.load_pixels(path)?, true)
            }
        };

        let [top, right, bottom, left] = image.crops;
        let (filters, raw_colors) = classify_cfa(image.cpp, &image.cfa.name);
        let bayer = FilterPattern::from_filters(filters).is_some();
        let decodable = image.width > 0
            && image.height > 0
            && (image.cpp == 3 || (image.cpp == 1 && (bayer || filters == FILTERS_NONE)));

        let source = ImageSource {
            path: path.to_path_buf(),
            image_width: image.width.saturating_sub(left + right) as u32,
            image_height: image.height.saturating_sub(top + bottom) as u32,
            raw_width: image.width as u32,
            raw_height: image.height as u32,
            filters,
            raw_colors,
            make: image.clean_make.clone(),
            model: image.clean_model.clone(),
            decodable,
            capture_time_millis: None,
            // rawloader does not surface EXIF dates; the file timestamp stands in.
            decoder_capture_time_millis: modified_millis(path),
        };

        debug!(
            make = %source.make,
            model = %source.model,
            width = source.raw_width,
            height = source.raw_height,
            cfa = %image.cfa.name,
            "Described RAW file"
        );

        if full {
            self.keep(path, image);
        }
        Ok(source)
    }

    fn decode(&self, source: &ImageSource, _progress: &ProgressHandle) -> Result<DecodedRaster> {
        let decoded = self.load_pixels(&source.path)?;

        let width = decoded.width;
        let height = decoded.height;
        let bands = if decoded.cpp == 3 { 3 } else { 1 };
        let bits_per_sample = bits_per_sample(&decoded.whitelevels);

        // Integer data is already u16, float data (normalized 0.0-1.0) is scaled to u16 range
        let data: Vec<u16> = match decoded.data {
            RawloaderImageData::Integer(values) => values,
            RawloaderImageData::Float(values) => values
                .iter()
                .map(|&v| (v * u16::MAX as f32).clamp(0.0, u16::MAX as f32) as u16)
                .collect(),
        };

        let bounds = Rect::new(0, 0, width as u32, height as u32);
        let raster = Raster::from_data(bounds, bands, data).ok_or_else(|| {
            PipelineError::DecodeFailure(format!(
                "{}: sample count does not match {}x{}x{}",
                source.path.display(),
                width,
                height,
                bands
            ))
        })?;

        debug!(width, height, bands, bits_per_sample, "Decoded RAW raster");
        Ok(DecodedRaster { raster, bits_per_sample })
    }

    fn release(&self, path: &Path) {
        if self.take_kept(path).is_some() {
            debug!(path = %path.display(), "Dropped image kept from describe");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_sample_from_white_level() {
        assert_eq!(bits_per_sample(&[4095, 4095, 4095, 4095]), 12);
        assert_eq!(bits_per_sample(&[16383, 0, 0, 0]), 14);
        assert_eq!(bits_per_sample(&[0, 0, 0, 0]), DEFAULT_BITS_PER_SAMPLE);
    }

    #[test]
    fn test_classify_cfa() {
        assert_eq!(classify_cfa(1, "RGGB"), (0x9494_9494, 3));
        assert_eq!(classify_cfa(1, "RGBE"), (FILTERS_NON_BAYER, 4));
        assert_eq!(classify_cfa(1, ""), (FILTERS_NONE, 1));
        assert_eq!(classify_cfa(3, "RGGB"), (FILTERS_NONE, 3));
    }

    /// rawloader recognizes headerless Pentax Optio S4 files by size alone.
    const OPTIO_S4_FILE_SIZE: usize = 6_114_240;

    fn write_optio_s4(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; OPTIO_S4_FILE_SIZE]).unwrap();
        path
    }

    #[test]
    fn test_describe_reads_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_optio_s4(dir.path(), "IMGP0001.RAW");
        let decoder = RawLoaderDecoder::new();

        let source = decoder.describe(&path).unwrap();
        assert_eq!(decoder.pixel_decodes(), 0);
        assert_eq!((source.raw_width, source.raw_height), (2346, 1737));
        assert_eq!((source.image_width, source.image_height), (2324, 1737));
        assert_eq!(source.filter_pattern(), Some(FilterPattern::Rggb));
        assert_eq!(source.raw_colors, 3);
        assert!(source.decodable);
        assert!(source.decoder_capture_time_millis.is_some());

        let decoded = decoder.decode(&source, &ProgressHandle::new()).unwrap();
        assert_eq!(decoder.pixel_decodes(), 1);
        assert_eq!(decoded.raster.bounds(), Rect::new(0, 0, 2346, 1737));
        assert_eq!(decoded.bits_per_sample, 12);
    }

    #[test]
    fn test_interleaved_describes_decode_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_optio_s4(dir.path(), "a.raw");
        let b = write_optio_s4(dir.path(), "b.raw");
        let decoder = RawLoaderDecoder::new();

        let source_a = decoder.describe(&a).unwrap();
        let _source_b = decoder.describe(&b).unwrap();
        decoder.release(&b);
        decoder.decode(&source_a, &ProgressHandle::new()).unwrap();

        assert_eq!(decoder.pixel_decodes(), 1);
    }

    #[test]
    fn test_describe_missing_file_is_decode_failure() {
        let decoder = RawLoaderDecoder::new();
        let err = decoder.describe(Path::new("/nonexistent/file.nef")).unwrap_err();
        assert!(matches!(err, PipelineError::DecodeFailure(_)));
    }
}
