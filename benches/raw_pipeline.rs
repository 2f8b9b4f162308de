use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use darkroom_rs::image_pipeline::debayer::{demosaic, DemosaicQuality};
use darkroom_rs::image_pipeline::{FilterPattern, MemoryTileCache, Raster, Rect, TiledImage};

fn generate_mock_cfa(width: u32, height: u32) -> Raster {
    let bounds = Rect::new(0, 0, width, height);
    let data = (0..height)
        .flat_map(|y| (0..width).map(move |x| (((x * 7 + y * 13) % 4096) as u16) << 2))
        .collect();
    Raster::from_data(bounds, 1, data).expect("mock CFA buffer matches its bounds")
}

fn benchmark_demosaic_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("demosaic_by_size");

    for (width, height, label) in [(256, 256, "256x256"), (1024, 768, "1024x768")] {
        let cfa = generate_mock_cfa(width, height);
        for (quality, name) in [(DemosaicQuality::EdgeDirected, "edge"), (DemosaicQuality::Linear, "linear")] {
            group.bench_with_input(BenchmarkId::new(name, label), &cfa, |b, cfa| {
                b.iter(|| demosaic(black_box(cfa), FilterPattern::Rggb, quality, 14));
            });
        }
    }

    group.finish();
}

fn benchmark_tiling(c: &mut Criterion) {
    let mut group = c.benchmark_group("tiling");
    let bounds = Rect::new(0, 0, 2048, 1536);
    let rgb = Raster::new(bounds, 3);

    for tile in [128u32, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(tile), &tile, |b, &tile| {
            let cache = Arc::new(MemoryTileCache::unbounded());
            b.iter(|| {
                let image = TiledImage::new(bounds, 3, tile, tile, cache.clone());
                image.set_data(black_box(&rgb));
                image
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_demosaic_sizes, benchmark_tiling);
criterion_main!(benches);
