use std::io::Cursor;

use bayer::{BayerDepth, CFA, Demosaic, RasterDepth, RasterMut};
use tracing::{debug, info};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::raster::Raster;
use crate::image_pipeline::debayer::DEMOSAIC_BORDER;
use crate::image_pipeline::raw::types::{Channel, FilterPattern};

/// Bilinear demosaic through the `bayer` crate. Fast, soft, used for previews.
pub struct LinearDebayer {
    pattern: FilterPattern,
}

impl LinearDebayer {
    pub fn new(pattern: FilterPattern) -> Self {
        Self { pattern }
    }

    /// The `bayer` crate names the CFA by its top-left block, so an odd
    /// raster origin selects a different rotation.
    fn local_cfa(&self, x0: i32, y0: i32) -> CFA {
        match (self.pattern.color_at(x0, y0), self.pattern.color_at(x0 + 1, y0)) {
            (Channel::Red, _) => CFA::RGGB,
            (Channel::Blue, _) => CFA::BGGR,
            (Channel::Green, Channel::Red) => CFA::GRBG,
            (Channel::Green, _) => CFA::GBRG,
        }
    }

    pub fn process(&self, cfa: &Raster, bits_per_sample: u32) -> Result<Raster> {
        let bounds = cfa.bounds();
        let (width, height) = (bounds.width as usize, bounds.height as usize);
        info!("Starting linear demosaic for image {}x{}", width, height);

        // bayer crate only supports 8 and 16 bit
        let (bayer_depth, raster_depth, bytes_per_pixel) = if bits_per_sample <= 8 {
            (BayerDepth::Depth8, RasterDepth::Depth8, 1)
        } else {
            (BayerDepth::Depth16LE, RasterDepth::Depth16, 2)
        };

        let bayer_bytes: Vec<u8> = if bits_per_sample <= 8 {
            cfa.data().iter().map(|&val| val as u8).collect()
        } else {
            cfa.data().iter().flat_map(|&val| val.to_le_bytes()).collect()
        };

        let mut output_buf = vec![0u8; width * height * 3 * bytes_per_pixel];
        let cfa_kind = self.local_cfa(bounds.x, bounds.y);
        debug!("Running demosaic with depth={:?}, CFA={:?}", bayer_depth, cfa_kind);

        {
            let mut output_raster = RasterMut::new(width, height, raster_depth, &mut output_buf);
            bayer::run_demosaic(
                &mut Cursor::new(&bayer_bytes[..]),
                bayer_depth,
                cfa_kind,
                Demosaic::Linear,
                &mut output_raster,
            )
            .map_err(|e| PipelineError::DecodeFailure(format!("Demosaic failed: {:?}", e)))?;
        }

        let rgb: Vec<u16> = if bytes_per_pixel == 1 {
            output_buf.iter().map(|&b| b as u16).collect()
        } else {
            output_buf
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .collect()
        };

        let full = Raster::from_data(bounds, 3, rgb).ok_or_else(|| {
            PipelineError::DecodeFailure("demosaic produced a short buffer".to_string())
        })?;
        Ok(full
            .crop(bounds.inset(DEMOSAIC_BORDER))
            .unwrap_or_else(|| Raster::new(bounds.inset(DEMOSAIC_BORDER), 3)))
    }
}
