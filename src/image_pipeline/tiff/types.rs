//! TIFF cache file configuration types

use tiff::encoder::compression::DeflateLevel;
use tiff::encoder::Compression;

/// Compression used for disk cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheCompression {
    /// No compression (fastest, largest file)
    None,
    /// LZW compression (slow, good compression)
    Lzw,
    /// Deflate compression - fast level (good speed/size balance)
    #[default]
    DeflateFast,
    /// Deflate compression - balanced
    DeflateBalanced,
    /// Deflate compression - best compression (slower)
    DeflateBest,
}

impl CacheCompression {
    pub(crate) fn to_tiff(self) -> Compression {
        match self {
            CacheCompression::None => Compression::Uncompressed,
            CacheCompression::Lzw => Compression::Lzw,
            CacheCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
            CacheCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
            CacheCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
        }
    }
}
