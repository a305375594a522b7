use std::sync::mpsc;
use std::sync::Mutex;

use glyphcast::sampler::ImageSource;
use glyphcast::{
    render, render_with_progress, spawn_render, ArtMode, Background, CancelToken, GlyphError,
    GlyphResult, RecordingSurface, RenderOptions, Rgb, SurfaceOp,
};
use image::{Rgba, RgbaImage};

fn ascii_options(columns: u32) -> RenderOptions {
    let mut options = RenderOptions::for_mode(ArtMode::Ascii);
    options.columns = columns;
    options
}

/// Advance of half the font size gives 6x12 px cells at the default 12 px font.
fn surface() -> RecordingSurface {
    RecordingSurface::with_advance_ratio(0.5)
}

fn white(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
}

#[test]
fn progress_is_batched_monotonic_and_ends_with_one_hundred() {
    let image = white(100, 100);
    let mut target = surface();
    let mut seen = Vec::new();
    let report = render_with_progress(
        &image,
        &mut target,
        &ascii_options(30),
        &mut |percent| seen.push(percent),
        &CancelToken::new(),
    )
    .expect("render should succeed");

    assert_eq!(report.geometry.rows, 15);
    assert_eq!(seen, vec![0, 67, 100]);
    assert_eq!(seen.iter().filter(|percent| **percent == 100).count(), 1);
}

#[test]
fn target_is_sized_then_filled_before_any_glyph() {
    let image = white(100, 100);
    let mut target = surface();
    let mut options = ascii_options(10);
    options.background = Background::Solid(Rgb::new(5, 0, 10));
    render(&image, &mut target, &options).expect("render should succeed");

    let ops = target.ops();
    assert_eq!(ops[0], SurfaceOp::Resize { width: 60, height: 60 });
    assert_eq!(
        ops[1],
        SurfaceOp::FillRect {
            x: 0.0,
            y: 0.0,
            width: 60.0,
            height: 60.0,
            color: Rgb::new(5, 0, 10),
        }
    );
}

#[test]
fn glyphs_are_painted_in_reading_order_at_cell_origins() {
    let image = white(60, 120);
    let mut target = surface();
    render(&image, &mut target, &ascii_options(3)).expect("render should succeed");

    let positions: Vec<(f32, f32)> = target.glyphs().iter().map(|(_, x, y)| (*x, *y)).collect();
    assert_eq!(
        positions,
        vec![
            (0.0, 0.0),
            (6.0, 0.0),
            (12.0, 0.0),
            (0.0, 12.0),
            (6.0, 12.0),
            (12.0, 12.0),
            (0.0, 24.0),
            (6.0, 24.0),
            (12.0, 24.0),
        ]
    );
    assert!(target.glyphs().iter().all(|(glyph, _, _)| *glyph == "@"));
}

#[test]
fn unchanged_style_is_set_only_once() {
    let image = white(100, 100);
    let mut target = surface();
    let report = render(&image, &mut target, &ascii_options(20)).expect("render should succeed");

    assert_eq!(report.painted_cells, report.geometry.cell_count());
    assert_eq!(target.count(|op| matches!(op, SurfaceOp::SetFill(_))), 1);
    assert_eq!(target.count(|op| matches!(op, SurfaceOp::SetShadow(_))), 1);
    assert_eq!(target.count(|op| matches!(op, SurfaceOp::SetFont(_))), 1);
}

#[test]
fn colorize_reissues_fill_only_when_the_color_changes() {
    let image = RgbaImage::from_fn(2, 4, |x, _| {
        if x == 0 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    });
    let mut options = ascii_options(2);
    options.colorize = true;
    let mut target = surface();
    let report = render(&image, &mut target, &options).expect("render should succeed");

    // Two columns alternate colors on every row.
    let rows = report.geometry.rows as usize;
    assert_eq!(target.count(|op| matches!(op, SurfaceOp::SetFill(_))), rows * 2);
    let first = target.ops().iter().find_map(|op| match op {
        SurfaceOp::FillText { color, .. } => *color,
        _ => None,
    });
    assert_eq!(first, Some(Rgb::new(255, 0, 0)));
}

#[test]
fn mosaic_layout_depends_only_on_image_size() {
    let gradient = RgbaImage::from_fn(90, 60, |x, y| Rgba([(x * 2) as u8, (y * 4) as u8, 90, 255]));
    let dark = RgbaImage::from_pixel(90, 60, Rgba([3, 3, 3, 255]));
    let mut options = RenderOptions::for_mode(ArtMode::Mosaic);
    options.columns = 9;
    options.threshold = 200;
    assert!(options.colorize);

    let mut first = surface();
    let mut second = surface();
    render(&gradient, &mut first, &options).expect("render should succeed");
    render(&dark, &mut second, &options).expect("render should succeed");

    assert!(!first.glyphs().is_empty());
    assert_eq!(first.glyphs(), second.glyphs());
    let fills = |target: &RecordingSurface| -> Vec<Option<Rgb>> {
        target
            .ops()
            .iter()
            .filter_map(|op| match op {
                SurfaceOp::FillText { color, .. } => Some(*color),
                _ => None,
            })
            .collect()
    };
    assert_ne!(fills(&first), fills(&second));
}

#[test]
fn dark_cells_below_threshold_are_not_painted() {
    let image = RgbaImage::from_pixel(50, 50, Rgba([50, 50, 50, 255]));
    let mut options = ascii_options(5);
    options.threshold = 100;
    let mut target = surface();
    let report = render(&image, &mut target, &options).expect("render should succeed");

    assert_eq!(report.painted_cells, 0);
    assert_eq!(report.skipped_cells, report.geometry.cell_count());
    assert!(target.glyphs().is_empty());
}

#[test]
fn transparent_background_clears_and_skips_clear_cells() {
    let image = RgbaImage::from_pixel(50, 50, Rgba([255, 255, 255, 0]));
    let mut options = ascii_options(5);
    options.background = Background::Transparent;
    let mut target = surface();
    render(&image, &mut target, &options).expect("render should succeed");

    assert!(matches!(target.ops()[1], SurfaceOp::ClearRect { .. }));
    assert_eq!(target.count(|op| matches!(op, SurfaceOp::FillRect { .. })), 0);
    assert!(target.glyphs().is_empty());
}

#[test]
fn emoji_mode_paints_with_sans_serif() {
    let image = white(30, 30);
    let mut options = RenderOptions::for_mode(ArtMode::Emoji);
    options.columns = 2;
    options.font_family = "serif".to_owned();
    let mut target = surface();
    render(&image, &mut target, &options).expect("render should succeed");

    let font = target.ops().iter().find_map(|op| match op {
        SurfaceOp::SetFont(font) => Some(font.clone()),
        _ => None,
    });
    let font = font.expect("a font should be set");
    assert_eq!(font.family, "sans-serif");
    assert_eq!(font.weight, "normal");
    assert_eq!(target.glyphs()[0].0, "🌕");
}

#[test]
fn cancelled_before_start_leaves_target_untouched() {
    let image = white(100, 100);
    let mut target = surface();
    let token = CancelToken::new();
    token.cancel();
    let mut seen = Vec::new();
    let error = render_with_progress(
        &image,
        &mut target,
        &ascii_options(30),
        &mut |percent| seen.push(percent),
        &token,
    )
    .expect_err("render should abort");

    assert!(error.is_aborted());
    assert!(target.ops().is_empty());
    assert!(seen.is_empty());
}

#[test]
fn cancel_during_render_stops_at_the_next_row() {
    let image = white(100, 100);
    let mut target = surface();
    let token = CancelToken::new();
    let trigger = token.clone();
    let mut seen = Vec::new();
    let error = render_with_progress(
        &image,
        &mut target,
        &ascii_options(30),
        &mut |percent| {
            seen.push(percent);
            trigger.cancel();
        },
        &token,
    )
    .expect_err("render should abort");

    assert_eq!(error, GlyphError::Aborted);
    assert_eq!(seen, vec![0]);
    assert_eq!(target.glyphs().len(), 30);
}

#[test]
fn zero_sized_image_is_rejected_before_painting() {
    let image = RgbaImage::new(0, 40);
    let mut target = surface();
    let error = render(&image, &mut target, &ascii_options(10)).expect_err("should fail");
    assert_eq!(error.code(), "INVALID_INPUT");
    assert!(target.ops().is_empty());
}

struct Tainted;

impl ImageSource for Tainted {
    fn dimensions(&self) -> (u32, u32) {
        (64, 64)
    }

    fn read_scaled(&self, _width: u32, _height: u32) -> GlyphResult<RgbaImage> {
        Err(GlyphError::security("pixel readback refused"))
    }
}

#[test]
fn unreadable_pixels_surface_as_security_error() {
    let mut target = surface();
    let error = render(&Tainted, &mut target, &ascii_options(10)).expect_err("should fail");
    assert_eq!(error.code(), "SECURITY_ERROR");
    assert!(error.hint().is_some_and(|hint| hint.contains("local image")));
}

#[test]
fn background_job_streams_progress_and_returns_the_surface() {
    let handle = spawn_render(white(100, 100), surface(), ascii_options(30))
        .expect("worker should spawn");
    let seen: Vec<u8> = handle.progress().iter().collect();
    let outcome = handle.join().expect("render should succeed");

    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(outcome.report.geometry.columns, 30);
    assert_eq!(outcome.surface.glyphs().len(), 30 * 15);
}

/// Blocks sampling until the test releases it.
struct Gated {
    image: RgbaImage,
    release: Mutex<mpsc::Receiver<()>>,
}

impl ImageSource for Gated {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn read_scaled(&self, width: u32, height: u32) -> GlyphResult<RgbaImage> {
        let release = self
            .release
            .lock()
            .map_err(|_| GlyphError::render("gate poisoned"))?;
        let _ = release.recv();
        self.image.read_scaled(width, height)
    }
}

#[test]
fn background_job_can_be_cancelled() {
    let (open_gate, release) = mpsc::channel();
    let source = Gated {
        image: white(100, 100),
        release: Mutex::new(release),
    };
    let handle = spawn_render(source, surface(), ascii_options(30)).expect("worker should spawn");
    handle.cancel();
    // The worker may already have stopped at its first cancellation check.
    let _ = open_gate.send(());

    let seen: Vec<u8> = handle.progress().iter().collect();
    let error = handle.join().expect_err("render should abort");
    assert!(error.is_aborted());
    assert!(!seen.contains(&100));
}
