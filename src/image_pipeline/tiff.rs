//! TIFF cache codec
//!
//! Serializes tiled images to 16-bit RGB TIFF files and reads them back.

mod reader;
mod standard_tiff_writer;
pub mod types;
mod writer;

pub use reader::read_tiled_image;
pub use standard_tiff_writer::StandardTiffWriter;
pub use types::CacheCompression;
pub use writer::{TiffWriter, WriteSeek};
