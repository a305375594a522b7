//! Re-render raster images as grids of glyphs: repeated words, ASCII ramps or emoji.
//!
//! The pipeline is geometry → sampling → glyph mapping → painting. [`render`]
//! paints onto any [`Surface`] incrementally with progress and cancellation;
//! [`export_text`] runs the same pipeline synchronously into plain text.

pub mod analytics;
pub mod config;
pub mod error;
pub mod export;
pub mod fonts;
pub mod geometry;
pub mod mapper;
pub mod options;
pub mod pixmap;
pub mod presets;
pub mod renderer;
pub mod sampler;
pub mod surface;

pub use error::{GlyphError, GlyphResult};
pub use export::{export_text, export_text_grid, TextGrid};
pub use geometry::{CellGeometry, FixedAdvance, TextMeasure};
pub use options::{ArtMode, Background, GlyphSet, RenderOptions, RenderOverrides, Rgb};
pub use pixmap::PixmapSurface;
pub use renderer::{
    render, render_with_progress, spawn_render, CancelToken, RenderHandle, RenderOutcome,
    RenderReport,
};
pub use sampler::ImageSource;
pub use surface::{FontSpec, RecordingSurface, Shadow, Surface, SurfaceOp};
