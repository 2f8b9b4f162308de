use std::path::Path;

use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::common::progress::ProgressHandle;
use crate::image_pipeline::raw::types::{DecodedRaster, ImageSource};

/// Native RAW decoder seam.
pub trait RawDecoder: Send + Sync {
    /// Reads decode parameters without producing pixels the caller keeps.
    fn describe(&self, path: &Path) -> Result<ImageSource>;

    /// Decodes the sensor data of `source`.
    fn decode(&self, source: &ImageSource, progress: &ProgressHandle) -> Result<DecodedRaster>;

    /// Called when `path` will not be decoded after all, so anything kept
    /// from `describe` can go.
    fn release(&self, _path: &Path) {}
}
