use std::fmt;

use crate::error::GlyphResult;
use crate::geometry::{FixedAdvance, TextMeasure};
use crate::options::Rgb;

/// Family, weight and pixel size of the active text style.
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub family: String,
    pub weight: String,
    pub size_px: f32,
}

impl FontSpec {
    pub fn new(family: &str, weight: &str, size_px: f32) -> Self {
        Self {
            family: family.to_owned(),
            weight: weight.to_owned(),
            size_px,
        }
    }

    pub fn is_bold(&self) -> bool {
        let weight = self.weight.trim().to_ascii_lowercase();
        match weight.as_str() {
            "bold" | "bolder" => true,
            other => other.parse::<u16>().is_ok_and(|value| value >= 600),
        }
    }

    /// CSS shorthand, e.g. `bold 12px monospace`.
    pub fn css(&self) -> String {
        format!("{} {}px {}", self.weight, self.size_px, self.family)
    }
}

impl fmt::Display for FontSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.css())
    }
}

/// Glow painted under each glyph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub blur_px: f32,
    pub color: Rgb,
}

/// A 2D raster target with canvas-style text state.
///
/// Fill, shadow and font are sticky: they apply to every following `fill_text`
/// until changed. `fill_rect` and `clear_rect` take their color explicitly and
/// leave that state alone.
pub trait Surface: TextMeasure {
    /// Reallocate to `width` x `height`, discarding previous content.
    fn resize(&mut self, width: u32, height: u32) -> GlyphResult<()>;

    fn size(&self) -> (u32, u32);

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) -> GlyphResult<()>;

    /// Reset the area to fully transparent.
    fn clear_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> GlyphResult<()>;

    fn set_fill(&mut self, color: Rgb);

    fn set_shadow(&mut self, shadow: Option<Shadow>);

    fn set_font(&mut self, font: &FontSpec) -> GlyphResult<()>;

    /// Paint `text` with its em box's top-left corner at (`x`, `y`).
    fn fill_text(&mut self, text: &str, x: f32, y: f32) -> GlyphResult<()>;
}

/// One call made against a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Resize {
        width: u32,
        height: u32,
    },
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
    },
    ClearRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    SetFill(Rgb),
    SetShadow(Option<Shadow>),
    SetFont(FontSpec),
    FillText {
        text: String,
        x: f32,
        y: f32,
        /// Fill in effect when the glyph was painted.
        color: Option<Rgb>,
    },
}

/// Surface that paints nothing and keeps a log of every call.
///
/// Used by tests and benchmarks to observe draw order and style changes
/// without a font or a pixel buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    ops: Vec<SurfaceOp>,
    width: u32,
    height: u32,
    fill: Option<Rgb>,
    measure: FixedAdvance,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_advance_ratio(ratio: f32) -> Self {
        Self {
            measure: FixedAdvance { ratio },
            ..Self::default()
        }
    }

    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<SurfaceOp> {
        std::mem::take(&mut self.ops)
    }

    /// Painted glyphs in draw order.
    pub fn glyphs(&self) -> Vec<(&str, f32, f32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                SurfaceOp::FillText { text, x, y, .. } => Some((text.as_str(), *x, *y)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&SurfaceOp) -> bool) -> usize {
        self.ops.iter().filter(|op| matches(op)).count()
    }
}

impl TextMeasure for RecordingSurface {
    fn measure_text(&mut self, text: &str, font: &FontSpec) -> f32 {
        self.measure.measure_text(text, font)
    }
}

impl Surface for RecordingSurface {
    fn resize(&mut self, width: u32, height: u32) -> GlyphResult<()> {
        self.width = width;
        self.height = height;
        self.ops.push(SurfaceOp::Resize { width, height });
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) -> GlyphResult<()> {
        self.ops.push(SurfaceOp::FillRect {
            x,
            y,
            width,
            height,
            color,
        });
        Ok(())
    }

    fn clear_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> GlyphResult<()> {
        self.ops.push(SurfaceOp::ClearRect {
            x,
            y,
            width,
            height,
        });
        Ok(())
    }

    fn set_fill(&mut self, color: Rgb) {
        self.fill = Some(color);
        self.ops.push(SurfaceOp::SetFill(color));
    }

    fn set_shadow(&mut self, shadow: Option<Shadow>) {
        self.ops.push(SurfaceOp::SetShadow(shadow));
    }

    fn set_font(&mut self, font: &FontSpec) -> GlyphResult<()> {
        self.ops.push(SurfaceOp::SetFont(font.clone()));
        Ok(())
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32) -> GlyphResult<()> {
        self.ops.push(SurfaceOp::FillText {
            text: text.to_owned(),
            x,
            y,
            color: self.fill,
        });
        Ok(())
    }
}
