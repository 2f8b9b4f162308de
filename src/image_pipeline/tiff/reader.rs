use std::io::{Read, Seek};
use std::sync::Arc;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use crate::image_pipeline::common::error::CacheError;
use crate::image_pipeline::common::raster::{Raster, Rect};
use crate::image_pipeline::tiles::{TileCache, TiledImage};

/// Reads a cache TIFF back into a new tiled image.
///
/// When `expected_description` is given the file's ImageDescription must
/// match it exactly.
pub fn read_tiled_image<R: Read + Seek>(
    input: R,
    expected_description: Option<&str>,
    cache: Arc<dyn TileCache>,
    tile_width: u32,
    tile_height: u32,
) -> Result<TiledImage, CacheError> {
    let mut decoder = Decoder::new(input)?.with_limits(Limits::unlimited());

    if let Some(expected) = expected_description {
        let found = decoder.get_tag_ascii_string(Tag::ImageDescription)?;
        if found.trim_end_matches('\0') != expected {
            return Err(CacheError::Format(format!("entry is for {:?}, not {:?}", found, expected)));
        }
    }

    let (width, height) = decoder.dimensions()?;
    match decoder.colortype()? {
        ColorType::RGB(16) => {}
        other => return Err(CacheError::Format(format!("unexpected colour type {:?}", other))),
    }

    let data = match decoder.read_image()? {
        DecodingResult::U16(data) => data,
        _ => return Err(CacheError::Format("expected 16-bit samples".to_string())),
    };
    let bounds = Rect::new(0, 0, width, height);
    let raster = Raster::from_data(bounds, 3, data)
        .ok_or_else(|| CacheError::Format("sample count does not match dimensions".to_string()))?;

    let image = TiledImage::new(bounds, 3, tile_width, tile_height, cache);
    image.set_data(&raster);
    debug!(width, height, "Loaded cache TIFF");
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::tiff::{CacheCompression, StandardTiffWriter, TiffWriter};
    use crate::image_pipeline::tiles::MemoryTileCache;
    use std::io::Cursor;

    fn sample_image(cache: Arc<dyn TileCache>) -> TiledImage {
        let bounds = Rect::new(0, 0, 45, 37);
        let data = (0..bounds.area() * 3).map(|i| (i * 7 % 65521) as u16).collect();
        let raster = Raster::from_data(bounds, 3, data).unwrap();
        let image = TiledImage::new(bounds, 3, 16, 16, cache);
        image.set_data(&raster);
        image
    }

    #[test]
    fn test_cache_tiff_preserves_pixels() {
        let cache: Arc<dyn TileCache> = Arc::new(MemoryTileCache::unbounded());
        let image = sample_image(cache.clone());

        for compression in [CacheCompression::None, CacheCompression::DeflateFast] {
            let mut buf = Cursor::new(Vec::new());
            StandardTiffWriter.write_tiff(&image, "a.nef:1:V5", &mut buf, compression).unwrap();
            buf.set_position(0);
            let back = read_tiled_image(buf, Some("a.nef:1:V5"), cache.clone(), 20, 20).unwrap();
            assert_eq!(back.to_raster(), image.to_raster());
        }
    }

    #[test]
    fn test_description_mismatch_is_rejected() {
        let cache: Arc<dyn TileCache> = Arc::new(MemoryTileCache::unbounded());
        let image = sample_image(cache.clone());
        let mut buf = Cursor::new(Vec::new());
        StandardTiffWriter.write_tiff(&image, "a.nef:1:V5", &mut buf, CacheCompression::None).unwrap();
        buf.set_position(0);
        let err = read_tiled_image(buf, Some("b.nef:1:V5"), cache, 16, 16).unwrap_err();
        assert!(matches!(err, CacheError::Format(_)));
    }

    #[test]
    fn test_garbage_is_an_error() {
        let cache: Arc<dyn TileCache> = Arc::new(MemoryTileCache::unbounded());
        let result = read_tiled_image(Cursor::new(vec![0u8; 64]), None, cache, 16, 16);
        assert!(result.is_err());
    }
}
