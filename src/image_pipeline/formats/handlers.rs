use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::config::PipelineConfig;
use crate::image_pipeline::conversions::{PipelineContext, RawConversionPipeline};
use crate::image_pipeline::formats::resolver::FormatResolver;
use crate::image_pipeline::raw::{FormatFamily, RawDecoder, RawLoaderDecoder};

/// One conversion pipeline per format family, created on first use. All of
/// them share the same context, so they share caches and workers while
/// keeping their own decode lock.
pub struct FormatHandlers {
    context: PipelineContext,
    config: PipelineConfig,
    decoder: Arc<dyn RawDecoder>,
    resolver: FormatResolver,
    pipelines: Mutex<HashMap<FormatFamily, Arc<RawConversionPipeline>>>,
}

impl FormatHandlers {
    pub fn new(context: PipelineContext, config: PipelineConfig, resolver: FormatResolver) -> Self {
        Self::with_decoder(context, config, resolver, Arc::new(RawLoaderDecoder::new()))
    }

    pub fn with_decoder(
        context: PipelineContext,
        config: PipelineConfig,
        resolver: FormatResolver,
        decoder: Arc<dyn RawDecoder>,
    ) -> Self {
        Self {
            context,
            config,
            decoder,
            resolver,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn decoder(&self) -> &Arc<dyn RawDecoder> {
        &self.decoder
    }

    pub fn pipeline(&self, family: FormatFamily) -> Arc<RawConversionPipeline> {
        let mut pipelines = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        let pipeline = pipelines.entry(family).or_insert_with(|| {
            debug!(%family, "Creating format pipeline");
            Arc::new(RawConversionPipeline::with_custom(
                family,
                Arc::clone(&self.decoder),
                self.context.clone(),
                self.config.clone(),
            ))
        });
        Arc::clone(pipeline)
    }

    /// Pipeline for the file at `path`.
    pub fn pipeline_for(&self, path: &Path) -> Result<Arc<RawConversionPipeline>> {
        let family = self.resolver.resolve(path).ok_or_else(|| {
            PipelineError::UnsupportedSource(format!("unrecognized file type: {}", path.display()))
        })?;
        Ok(self.pipeline(family))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::tiles::MemoryTileCache;

    fn handlers() -> FormatHandlers {
        let config = PipelineConfig::builder().workers(1).build();
        let context = PipelineContext::new(Arc::new(MemoryTileCache::unbounded()), None, &config).unwrap();
        FormatHandlers::new(context, config, FormatResolver::default())
    }

    #[test]
    fn test_one_pipeline_per_family() {
        let handlers = handlers();
        let a = handlers.pipeline(FormatFamily::Nef);
        let b = handlers.pipeline(FormatFamily::Nef);
        let c = handlers.pipeline(FormatFamily::Raf);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.family(), FormatFamily::Raf);
    }

    #[test]
    fn test_pipeline_for_unknown_file() {
        let handlers = handlers();
        assert!(matches!(
            handlers.pipeline_for(Path::new("/tmp/photo.jpeg")),
            Err(PipelineError::UnsupportedSource(_))
        ));
        assert_eq!(
            handlers.pipeline_for(Path::new("/tmp/photo.dng")).unwrap().family(),
            FormatFamily::Dng
        );
    }
}
