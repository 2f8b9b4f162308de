//! Debayering module for converting Bayer pattern RAW rasters to RGB

pub mod cpu_debayer;
pub mod linear_debayer;
pub mod types;

pub use cpu_debayer::CpuDebayer;
pub use linear_debayer::LinearDebayer;
pub use types::DemosaicQuality;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::raster::Raster;
use crate::image_pipeline::raw::types::FilterPattern;

/// Pixels dropped on every side of a demosaiced raster.
pub const DEMOSAIC_BORDER: u32 = 4;

/// Turns a single-band CFA raster into a three-band one, 4 pixels smaller
/// on each side.
pub fn demosaic(
    cfa: &Raster,
    pattern: FilterPattern,
    quality: DemosaicQuality,
    bits_per_sample: u32,
) -> Result<Raster> {
    if cfa.bands() != 1 {
        return Err(PipelineError::DecodeFailure(format!(
            "expected a single-band CFA raster, got {} bands",
            cfa.bands()
        )));
    }
    match quality {
        DemosaicQuality::EdgeDirected => Ok(CpuDebayer::new(pattern).process(cfa)),
        DemosaicQuality::Linear => LinearDebayer::new(pattern).process(cfa, bits_per_sample),
    }
}
