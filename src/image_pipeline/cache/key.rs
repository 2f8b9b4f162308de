use std::fmt;

use sha2::{Digest, Sha256};

use crate::image_pipeline::raw::types::ImageSource;

/// Version of the cached raster layout. Bumping it orphans every older entry.
pub const FORMAT_VERSION: u32 = 5;

/// Identity of a decoded raster: `"{filename}:{capture millis}:V{version}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(file_name: &str, capture_millis: i64, format_version: u32) -> Self {
        CacheKey(format!("{}:{}:V{}", file_name, capture_millis, format_version))
    }

    /// Key for `source`, or `None` when no capture time is known.
    pub fn for_source(source: &ImageSource, format_version: u32) -> Option<Self> {
        let millis = source.capture_time()?;
        Some(Self::new(&source.file_name(), millis, format_version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content-addressed file name for this key.
    pub fn file_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        format!("{:x}.tif", hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_key_format() {
        let key = CacheKey::new("DSC_0001.NEF", 1_300_000_000_000, 5);
        assert_eq!(key.as_str(), "DSC_0001.NEF:1300000000000:V5");
    }

    #[test]
    fn test_key_determinism() {
        let a = CacheKey::new("a.cr2", 10, 5);
        assert_eq!(a, CacheKey::new("a.cr2", 10, 5));
        assert_eq!(a.file_name(), CacheKey::new("a.cr2", 10, 5).file_name());
        assert_ne!(a, CacheKey::new("b.cr2", 10, 5));
        assert_ne!(a, CacheKey::new("a.cr2", 11, 5));
        assert_ne!(a.file_name(), CacheKey::new("a.cr2", 10, 6).file_name());
    }

    #[test]
    fn test_file_name_is_sha256_hex() {
        let name = CacheKey::new("a.cr2", 10, 5).file_name();
        assert_eq!(name.len(), 64 + 4);
        assert!(name.ends_with(".tif"));
        assert!(name[..64].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_for_source_uses_file_name_and_fallback_time() {
        let source = ImageSource {
            path: PathBuf::from("/photos/2011/IMG_1.CR2"),
            decoder_capture_time_millis: Some(99),
            ..Default::default()
        };
        assert_eq!(CacheKey::for_source(&source, 5).unwrap().as_str(), "IMG_1.CR2:99:V5");
        assert!(CacheKey::for_source(&ImageSource::default(), 5).is_none());
    }
}
