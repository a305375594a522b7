use crate::error::{GlyphError, GlyphResult};
use crate::geometry::{resolve, CellGeometry, TextMeasure};
use crate::mapper::GlyphMapper;
use crate::options::RenderOptions;
use crate::sampler::{sample, Adjustments, ImageSource};

/// Plain-text rendition of a glyph grid: `rows` lines of `columns` glyphs each.
///
/// Skipped cells hold a single space so columns stay aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct TextGrid {
    geometry: CellGeometry,
    lines: Vec<String>,
}

impl TextGrid {
    pub fn geometry(&self) -> CellGeometry {
        self.geometry
    }

    pub fn columns(&self) -> u32 {
        self.geometry.columns
    }

    pub fn rows(&self) -> u32 {
        self.geometry.rows
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines joined with `\n`, each row terminated by a newline.
    pub fn to_text(&self) -> String {
        let capacity = self.lines.iter().map(|line| line.len() + 1).sum();
        let mut text = String::with_capacity(capacity);
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

/// Run geometry, sampling and glyph selection synchronously and collect the result as text.
///
/// Uses `measure` for cell sizing so the grid matches a render against a
/// surface with the same font metrics.
#[tracing::instrument(level = "debug", skip_all, fields(mode = %options.mode, columns = options.columns))]
pub fn export_text_grid<I, M>(image: &I, options: &RenderOptions, measure: &mut M) -> GlyphResult<TextGrid>
where
    I: ImageSource + ?Sized,
    M: TextMeasure + ?Sized,
{
    options.validate()?;
    let (image_width, image_height) = image.dimensions();
    if image_width == 0 || image_height == 0 {
        return Err(GlyphError::invalid_input("image has zero width or height"));
    }

    let glyphs = options.glyph_set();
    let geometry = resolve(image_width, image_height, options, &glyphs, measure);
    let grid = sample(
        image,
        geometry.columns,
        geometry.rows,
        Adjustments::from_options(options),
    )?;
    let mapper = GlyphMapper::new(options, &glyphs);

    let lines = (0..geometry.rows)
        .map(|y| {
            let mut line = String::with_capacity(geometry.columns as usize);
            for (x, pixel) in grid.row(y).iter().enumerate() {
                line.push_str(mapper.pick(*pixel, x as u32, y).glyph().unwrap_or(" "));
            }
            line
        })
        .collect();

    Ok(TextGrid { geometry, lines })
}

/// [`export_text_grid`] rendered straight to a string.
pub fn export_text<I, M>(image: &I, options: &RenderOptions, measure: &mut M) -> GlyphResult<String>
where
    I: ImageSource + ?Sized,
    M: TextMeasure + ?Sized,
{
    export_text_grid(image, options, measure).map(|grid| grid.to_text())
}
