use thiserror::Error;

/// Errors that cross the pipeline boundary.
///
/// Cache problems never show up here: they are reported as [`CacheError`],
/// logged, and absorbed by the pipeline. A cancelled conversion is not an
/// error either; it yields `Ok(None)`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unsupported camera: {0}")]
    UnsupportedSource(String),

    #[error("Bad image: {0}")]
    DecodeFailure(String),

    #[error("Pipeline setup failed: {0}")]
    Setup(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Disk cache failures. Always non-fatal.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("malformed cache entry: {0}")]
    Format(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::UnsupportedSource("Leaf Aptus 75".to_string());
        assert_eq!(err.to_string(), "Unsupported camera: Leaf Aptus 75");

        let err = PipelineError::DecodeFailure("truncated strip".to_string());
        assert_eq!(err.to_string(), "Bad image: truncated strip");
    }

    #[test]
    fn test_cache_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CacheError = io.into();
        assert!(matches!(err, CacheError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }
}
