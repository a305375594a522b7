//! Glyph grid benchmarks: text export and a full render onto a recording surface.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glyphcast::{export_text, render, ArtMode, FixedAdvance, RecordingSurface, RenderOptions};
use image::{Rgba, RgbaImage};

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    })
}

fn bench_render(c: &mut Criterion) {
    let image = gradient(1280, 720);
    let mut options = RenderOptions::for_mode(ArtMode::Ascii);
    options.columns = 160;

    let mut group = c.benchmark_group("render_frame");
    group.sample_size(30);

    group.bench_function("export_text_720p_160cols", |b| {
        b.iter(|| {
            let text = export_text(&image, &options, &mut FixedAdvance::default()).expect("export");
            black_box(text)
        });
    });

    group.bench_function("recording_render_720p_160cols", |b| {
        b.iter(|| {
            let mut surface = RecordingSurface::new();
            let report = render(&image, &mut surface, &options).expect("render");
            black_box((report, surface.ops().len()))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
