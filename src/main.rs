use std::path::PathBuf;

use anyhow::{bail, Context};
use darkroom_rs::image_pipeline::{
    FileCacheConfig, FormatHandlers, FormatResolver, PipelineConfig, PipelineContext, ProgressHandle,
    TileCacheConfig,
};
use darkroom_rs::logger;

use tracing::info;

fn main() -> anyhow::Result<()> {
    logger::init();

    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        bail!("usage: darkroom_rs <raw file>");
    };

    let config = PipelineConfig::default();
    let context = PipelineContext::with_defaults(&config, FileCacheConfig::default(), TileCacheConfig::default())?;
    let handlers = FormatHandlers::new(context.clone(), config, FormatResolver::default());

    let pipeline = handlers.pipeline_for(&path)?;
    info!(family = %pipeline.family(), path = %path.display(), "Opening RAW file");

    let source = handlers
        .decoder()
        .describe(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    info!(
        make = %source.make,
        model = %source.model,
        "Sensor {}x{}, image {}x{}",
        source.raw_width,
        source.raw_height,
        source.image_width,
        source.image_height
    );

    let progress = ProgressHandle::new();
    let (image, timings) = pipeline.convert_with_timings(&source, &progress)?;
    let image = image.context("conversion was cancelled")?;

    info!(
        width = image.width(),
        height = image.height(),
        tiles = image.num_tiles(),
        "Developed image ready"
    );
    timings.log_summary();

    context.flush();
    Ok(())
}
