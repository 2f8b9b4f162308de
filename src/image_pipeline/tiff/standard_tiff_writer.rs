use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::debug;

use crate::image_pipeline::common::error::CacheError;
use crate::image_pipeline::common::raster::Rect;
use crate::image_pipeline::tiff::types::CacheCompression;
use crate::image_pipeline::tiff::writer::{TiffWriter, WriteSeek};
use crate::image_pipeline::tiles::TiledImage;

/// Writes one strip per row of tiles, so only one tile row is ever
/// materialized as a contiguous buffer.
pub struct StandardTiffWriter;

impl TiffWriter for StandardTiffWriter {
    fn write_tiff(
        &self,
        image: &TiledImage,
        description: &str,
        output: &mut dyn WriteSeek,
        compression: CacheCompression,
    ) -> Result<(), CacheError> {
        if image.bands() != 3 {
            return Err(CacheError::Format(format!("expected 3 bands, got {}", image.bands())));
        }
        debug!("Encoding cache TIFF: {}x{}", image.width(), image.height());

        let mut encoder = TiffEncoder::new(output)?.with_compression(compression.to_tiff());
        let mut tiff = encoder.new_image::<colortype::RGB16>(image.width(), image.height())?;
        tiff.encoder().write_tag(Tag::ImageDescription, description)?;
        tiff.rows_per_strip(image.tile_height())?;

        let bounds = image.bounds();
        for ty in 0..image.num_tiles_y() {
            let top = bounds.y + (ty * image.tile_height()) as i32;
            let rows = image.tile_height().min((bounds.bottom() - top) as u32);
            let strip = image.get_data(Rect::new(bounds.x, top, bounds.width, rows));
            tiff.write_strip(strip.data())?;
        }
        tiff.finish()?;

        debug!("TIFF encoding complete");
        Ok(())
    }
}
