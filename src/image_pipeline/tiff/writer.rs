use std::io::{Seek, Write};

use crate::image_pipeline::common::error::CacheError;
use crate::image_pipeline::tiff::types::CacheCompression;
use crate::image_pipeline::tiles::TiledImage;

/// Anything a TIFF can be encoded into.
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek + ?Sized> WriteSeek for T {}

pub trait TiffWriter: Send + Sync {
    /// Encodes `image` as 16-bit RGB, tagging it with `description`.
    fn write_tiff(
        &self,
        image: &TiledImage,
        description: &str,
        output: &mut dyn WriteSeek,
        compression: CacheCompression,
    ) -> Result<(), CacheError>;
}
