use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fontdue::layout::{
    CoordinateSystem, GlyphRasterConfig, Layout, LayoutSettings, TextStyle, VerticalAlign,
};
use fontdue::Font;
use image::{ImageFormat, Rgba, RgbaImage};
use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

use crate::error::{GlyphError, GlyphResult};
use crate::fonts::{missing_codepoints, FontBook};
use crate::geometry::{TextMeasure, FALLBACK_ADVANCE_RATIO};
use crate::options::Rgb;
use crate::surface::{FontSpec, Shadow, Surface};

/// Glow radius ceiling in pixels; larger blurs are painted at this radius.
pub const MAX_BLUR_RADIUS: usize = 64;

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    height: usize,
    coverage: Vec<u8>,
}

/// CPU raster target backed by a tiny-skia pixmap, with glyphs rasterized by fontdue.
///
/// Without any configured font the surface paints a solid block per glyph,
/// glow included, so output still shows the grid's shape and colors.
pub struct PixmapSurface {
    pixmap: Pixmap,
    fonts: FontBook,
    layout: Layout,
    glyph_cache: HashMap<GlyphRasterConfig, GlyphBitmap>,
    fill: Rgb,
    shadow: Option<Shadow>,
    font: FontSpec,
    face: Option<Arc<Font>>,
    warned_missing_face: bool,
}

impl PixmapSurface {
    pub fn new(fonts: FontBook) -> GlyphResult<Self> {
        let pixmap =
            Pixmap::new(1, 1).ok_or_else(|| GlyphError::render("failed to allocate pixmap"))?;
        Ok(Self {
            pixmap,
            fonts,
            layout: Layout::new(CoordinateSystem::PositiveYDown),
            glyph_cache: HashMap::new(),
            fill: Rgb::BLACK,
            shadow: None,
            font: FontSpec::new("monospace", "normal", 12.0),
            face: None,
            warned_missing_face: false,
        })
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Straight-alpha pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let color = self.pixmap.pixel(x, y)?.demultiply();
        Some([color.red(), color.green(), color.blue(), color.alpha()])
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        let width = self.pixmap.width();
        RgbaImage::from_fn(width, self.pixmap.height(), |x, y| {
            let color = self.pixmap.pixels()[(y * width + x) as usize].demultiply();
            Rgba([color.red(), color.green(), color.blue(), color.alpha()])
        })
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        self.to_rgba_image()
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    fn measure_face(&self, spec: &FontSpec, text: &str) -> Option<Arc<Font>> {
        let face = self.fonts.resolve(spec)?;
        match self.fonts.emoji() {
            Some(emoji) if !missing_codepoints(&face, text).is_empty() => Some(emoji.clone()),
            _ => Some(face),
        }
    }

    fn fill_block(&mut self, text: &str, x: f32, y: f32) -> GlyphResult<()> {
        let size = self.font.size_px;
        let width = text.chars().filter(|ch| !ch.is_whitespace()).count() as f32
            * size
            * FALLBACK_ADVANCE_RATIO;
        let block_width = width.ceil().max(0.0) as usize;
        let block_height = (size * 0.7).round().max(0.0) as usize;
        if block_width == 0 || block_height == 0 {
            return Ok(());
        }
        let block = GlyphBitmap {
            width: block_width,
            height: block_height,
            coverage: vec![255; block_width * block_height],
        };
        let gx = x.round() as i32;
        let gy = (y + size * 0.15).round() as i32;
        paint_coverage(&mut self.pixmap, gx, gy, &block, self.fill, self.shadow);
        Ok(())
    }
}

impl TextMeasure for PixmapSurface {
    fn measure_text(&mut self, text: &str, font: &FontSpec) -> f32 {
        match self.measure_face(font, text) {
            Some(face) => text
                .chars()
                .map(|ch| face.metrics(ch, font.size_px).advance_width)
                .sum(),
            None => 0.0,
        }
    }
}

impl Surface for PixmapSurface {
    fn resize(&mut self, width: u32, height: u32) -> GlyphResult<()> {
        self.pixmap = Pixmap::new(width.max(1), height.max(1)).ok_or_else(|| {
            GlyphError::render(format!("failed to allocate a {width}x{height} pixmap"))
        })?;
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) -> GlyphResult<()> {
        let Some(rect) = Rect::from_xywh(x, y, width, height) else {
            return Ok(());
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, 255);
        paint.anti_alias = false;
        self.pixmap
            .fill_rect(rect, &paint, Transform::identity(), None);
        Ok(())
    }

    fn clear_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> GlyphResult<()> {
        let (surface_width, surface_height) = self.size();
        if x <= 0.0 && y <= 0.0 && x + width >= surface_width as f32 && y + height >= surface_height as f32 {
            self.pixmap.fill(Color::TRANSPARENT);
            return Ok(());
        }

        let x0 = x.max(0.0).floor() as u32;
        let y0 = y.max(0.0).floor() as u32;
        let x1 = ((x + width).ceil().max(0.0) as u32).min(surface_width);
        let y1 = ((y + height).ceil().max(0.0) as u32).min(surface_height);
        let data = self.pixmap.data_mut();
        for row in y0..y1 {
            let start = ((row * surface_width + x0) * 4) as usize;
            let end = ((row * surface_width + x1) * 4) as usize;
            if start < end {
                data[start..end].fill(0);
            }
        }
        Ok(())
    }

    fn set_fill(&mut self, color: Rgb) {
        self.fill = color;
    }

    fn set_shadow(&mut self, shadow: Option<Shadow>) {
        self.shadow = shadow;
    }

    fn set_font(&mut self, font: &FontSpec) -> GlyphResult<()> {
        if (self.font.size_px - font.size_px).abs() > f32::EPSILON {
            self.glyph_cache.clear();
        }
        self.font = font.clone();
        self.face = self.fonts.resolve(font);
        if self.face.is_none() && !self.warned_missing_face {
            self.warned_missing_face = true;
            tracing::warn!(font = %font, "no font face configured, painting solid blocks");
        }
        Ok(())
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32) -> GlyphResult<()> {
        let Some(primary) = self.face.clone() else {
            return self.fill_block(text, x, y);
        };

        let mut faces = vec![primary.clone()];
        let face_index = match self.fonts.emoji() {
            Some(emoji) if !missing_codepoints(&primary, text).is_empty() => {
                faces.push(emoji.clone());
                1
            }
            _ => 0,
        };

        self.layout.reset(&LayoutSettings {
            x,
            y,
            vertical_align: VerticalAlign::Top,
            ..LayoutSettings::default()
        });
        self.layout
            .append(faces.as_slice(), &TextStyle::new(text, self.font.size_px, face_index));
        let placed = self.layout.glyphs().to_vec();

        for glyph in placed {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let face = &faces[glyph.font_index];
            let bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, coverage) = face.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    coverage,
                }
            });

            let gx = glyph.x.round() as i32;
            let gy = glyph.y.round() as i32;
            paint_coverage(&mut self.pixmap, gx, gy, bitmap, self.fill, self.shadow);
        }
        Ok(())
    }
}

/// Glow first when a shadow is set, then the mask itself in `fill`.
fn paint_coverage(
    pixmap: &mut Pixmap,
    x: i32,
    y: i32,
    mask: &GlyphBitmap,
    fill: Rgb,
    shadow: Option<Shadow>,
) {
    if let Some(shadow) = shadow {
        let (halo, pad) = blur_coverage(mask, shadow.blur_px);
        blend_coverage(pixmap, x - pad, y - pad, &halo, shadow.color);
    }
    blend_coverage(pixmap, x, y, mask, fill);
}

fn blend_coverage(pixmap: &mut Pixmap, x: i32, y: i32, glyph: &GlyphBitmap, color: Rgb) {
    let width = pixmap.width() as i32;
    let height = pixmap.height() as i32;
    let data = pixmap.data_mut();
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= height {
            continue;
        }
        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= width {
                continue;
            }
            let coverage = glyph.coverage[row * glyph.width + col];
            let idx = ((py * width + px) * 4) as usize;
            blend_pixel(data, idx, color, coverage);
        }
    }
}

/// Source-over into premultiplied RGBA.
fn blend_pixel(data: &mut [u8], idx: usize, color: Rgb, alpha: u8) {
    let alpha = u16::from(alpha);
    if alpha == 0 {
        return;
    }
    let inv_alpha = 255 - alpha;
    for (channel, src) in color.to_array().into_iter().enumerate() {
        let dst = u16::from(data[idx + channel]);
        data[idx + channel] = ((u16::from(src) * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    let dst_alpha = u16::from(data[idx + 3]);
    data[idx + 3] = ((alpha * 255 + dst_alpha * inv_alpha + 127) / 255) as u8;
}

/// Two-pass box blur of a coverage mask, padded so the halo is not clipped.
///
/// Returns the blurred mask and its padding on each side.
fn blur_coverage(glyph: &GlyphBitmap, blur_px: f32) -> (GlyphBitmap, i32) {
    let radius = (blur_px / 2.0).ceil().clamp(1.0, MAX_BLUR_RADIUS as f32) as usize;
    let width = glyph.width + radius * 2;
    let height = glyph.height + radius * 2;

    let mut plane = vec![0_u32; width * height];
    for row in 0..glyph.height {
        for col in 0..glyph.width {
            plane[(row + radius) * width + col + radius] =
                u32::from(glyph.coverage[row * glyph.width + col]);
        }
    }

    let window = (radius * 2 + 1) as u32;
    let mut horizontal = vec![0_u32; width * height];
    for row in 0..height {
        for col in 0..width {
            let lo = col.saturating_sub(radius);
            let hi = (col + radius).min(width - 1);
            let sum: u32 = plane[row * width + lo..=row * width + hi].iter().sum();
            horizontal[row * width + col] = sum / window;
        }
    }

    let mut coverage = vec![0_u8; width * height];
    for row in 0..height {
        let lo = row.saturating_sub(radius);
        let hi = (row + radius).min(height - 1);
        for col in 0..width {
            let sum: u32 = (lo..=hi).map(|r| horizontal[r * width + col]).sum();
            coverage[row * width + col] = (sum / window).min(255) as u8;
        }
    }

    (
        GlyphBitmap {
            width,
            height,
            coverage,
        },
        radius as i32,
    )
}
