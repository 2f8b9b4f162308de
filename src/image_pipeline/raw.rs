//! RAW image reading module
//!
//! Format-agnostic description and decoding of camera RAW files.

mod reader;
mod rawloader_reader;
pub mod types;

pub use reader::RawDecoder;
pub use rawloader_reader::RawLoaderDecoder;
pub use types::{Channel, DecodedRaster, FilterPattern, FormatFamily, ImageSource};
