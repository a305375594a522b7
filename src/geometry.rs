use serde::Serialize;

use crate::options::{GlyphSet, RenderOptions};
use crate::surface::FontSpec;

/// Row count never exceeds this, whatever the aspect ratio.
pub const MAX_ROWS: u32 = 500;

/// Cell advance as a fraction of the font size when measuring yields nothing usable.
pub const FALLBACK_ADVANCE_RATIO: f32 = 0.6;

/// Anything that can report the advance width of a string in a given font.
pub trait TextMeasure {
    fn measure_text(&mut self, text: &str, font: &FontSpec) -> f32;
}

/// Measurer for environments without font metrics: every char advances `ratio * size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedAdvance {
    pub ratio: f32,
}

impl Default for FixedAdvance {
    fn default() -> Self {
        Self {
            ratio: FALLBACK_ADVANCE_RATIO,
        }
    }
}

impl TextMeasure for FixedAdvance {
    fn measure_text(&mut self, text: &str, font: &FontSpec) -> f32 {
        text.chars().count() as f32 * font.size_px * self.ratio
    }
}

/// Output grid shape and the pixel size of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellGeometry {
    pub cell_width: f32,
    pub cell_height: f32,
    pub columns: u32,
    pub rows: u32,
}

impl CellGeometry {
    /// Canvas pixel size, `floor(columns * cell_width)` by `floor(rows * cell_height)`, at least 1x1.
    pub fn canvas_size(&self) -> (u32, u32) {
        let width = (self.columns as f32 * self.cell_width).floor().max(1.0);
        let height = (self.rows as f32 * self.cell_height).floor().max(1.0);
        (width as u32, height as u32)
    }

    /// Top-left corner of cell (`x`, `y`).
    pub fn cell_origin(&self, x: u32, y: u32) -> (f32, f32) {
        (x as f32 * self.cell_width, y as f32 * self.cell_height)
    }

    pub fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }
}

/// Work out the cell size from the measured glyph and the row count from the image aspect.
#[tracing::instrument(level = "debug", skip(options, glyphs, measure), fields(columns = options.columns))]
pub fn resolve<M>(
    image_width: u32,
    image_height: u32,
    options: &RenderOptions,
    glyphs: &GlyphSet,
    measure: &mut M,
) -> CellGeometry
where
    M: TextMeasure + ?Sized,
{
    let font = options.font();
    let spacing = options.effective_spacing();

    let measured = measure.measure_text(glyphs.class().measure_glyph(), &font);
    let advance = if measured.is_finite() && measured > 0.0 {
        measured
    } else {
        tracing::debug!(measured, "measured advance unusable, using fixed ratio");
        font.size_px * FALLBACK_ADVANCE_RATIO
    };

    let cell_width = advance * spacing;
    let cell_height = font.size_px * spacing;
    let columns = options.columns.max(1);
    let rows = rows_for(columns, image_width, image_height, cell_width, cell_height);

    CellGeometry {
        cell_width,
        cell_height,
        columns,
        rows,
    }
}

/// `floor(columns * (h / w) * (cell_w / cell_h))`, clamped to `1..=MAX_ROWS`.
///
/// Degenerate inputs (zero width, NaN) produce a single row.
pub fn rows_for(
    columns: u32,
    image_width: u32,
    image_height: u32,
    cell_width: f32,
    cell_height: f32,
) -> u32 {
    let raw = (columns as f64 * image_height as f64 * cell_width as f64)
        / (image_width as f64 * cell_height as f64);
    let rows = raw.floor();
    if !rows.is_finite() || rows <= 0.0 {
        1
    } else {
        rows.min(MAX_ROWS as f64) as u32
    }
}
