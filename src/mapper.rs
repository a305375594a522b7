use crate::options::{ArtMode, GlyphSet, RenderOptions, Rgb};

/// Rec. 601 luma of an sRGB triple, 0..=255.
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

/// Ramp index for `luma`, or `None` when it falls below `threshold`.
///
/// The band `[threshold, 256)` is split evenly across `len` glyphs; `invert`
/// reads the ramp from the other end.
pub fn ramp_index(luma: f64, threshold: u8, len: usize, invert: bool) -> Option<usize> {
    let threshold = threshold as f64;
    if luma < threshold || len == 0 {
        return None;
    }
    let range = (256.0 - threshold).max(1.0);
    let raw = ((luma - threshold) / range * len as f64).floor();
    let index = (raw.max(0.0) as usize).min(len - 1);
    Some(if invert { len - 1 - index } else { index })
}

/// What to paint in one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellDecision<'a> {
    Skip,
    Paint { glyph: &'a str, color: Rgb },
}

impl<'a> CellDecision<'a> {
    pub fn glyph(&self) -> Option<&'a str> {
        match self {
            Self::Skip => None,
            Self::Paint { glyph, .. } => Some(glyph),
        }
    }
}

/// Per-cell glyph and color selection for one set of options.
#[derive(Debug, Clone)]
pub struct GlyphMapper<'a> {
    glyphs: &'a GlyphSet,
    mode: ArtMode,
    columns: u32,
    threshold: u8,
    invert: bool,
    colorize: bool,
    text_color: Rgb,
    skip_clear_cells: bool,
}

impl<'a> GlyphMapper<'a> {
    pub fn new(options: &RenderOptions, glyphs: &'a GlyphSet) -> Self {
        Self {
            glyphs,
            mode: options.mode,
            columns: options.columns.max(1),
            threshold: options.threshold,
            invert: options.invert,
            colorize: options.colorize,
            text_color: options.text_color,
            skip_clear_cells: options.background.is_transparent(),
        }
    }

    /// Index into the glyph set for the cell at (`x`, `y`), or `None` to leave it empty.
    pub fn glyph_index(&self, pixel: [u8; 4], x: u32, y: u32) -> Option<usize> {
        let [r, g, b, a] = pixel;
        if self.skip_clear_cells && a == 0 {
            return None;
        }
        match self.mode {
            ArtMode::Mosaic => {
                let position = y as usize * self.columns as usize + x as usize;
                Some(position % self.glyphs.len())
            }
            ArtMode::Ascii | ArtMode::Emoji => {
                ramp_index(luminance(r, g, b), self.threshold, self.glyphs.len(), self.invert)
            }
        }
    }

    pub fn pick(&self, pixel: [u8; 4], x: u32, y: u32) -> CellDecision<'a> {
        let Some(index) = self.glyph_index(pixel, x, y) else {
            return CellDecision::Skip;
        };
        let color = if self.colorize {
            Rgb::new(pixel[0], pixel[1], pixel[2])
        } else {
            self.text_color
        };
        CellDecision::Paint {
            glyph: self.glyphs.get(index),
            color,
        }
    }
}
