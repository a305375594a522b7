use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::error::{GlyphError, GlyphResult};
use crate::geometry::{resolve, CellGeometry};
use crate::mapper::{CellDecision, GlyphMapper};
use crate::options::{Background, RenderOptions, Rgb};
use crate::sampler::{sample, Adjustments, ImageSource};
use crate::surface::{FontSpec, Shadow, Surface};

/// Rows painted between progress reports and cooperative yields.
pub const ROW_BATCH: u32 = 10;

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> GlyphResult<()> {
        if self.is_cancelled() {
            Err(GlyphError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// What a completed render produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderReport {
    pub geometry: CellGeometry,
    pub painted_cells: usize,
    pub skipped_cells: usize,
}

/// Render `image` into `target` without progress reporting or cancellation.
pub fn render<I, S>(image: &I, target: &mut S, options: &RenderOptions) -> GlyphResult<RenderReport>
where
    I: ImageSource + ?Sized,
    S: Surface + ?Sized,
{
    render_with_progress(image, target, options, &mut |_| {}, &CancelToken::new())
}

/// Render `image` into `target`, reporting progress every [`ROW_BATCH`] rows.
///
/// `on_progress` receives non-decreasing percentages and exactly one final 100
/// on success. Cancellation is observed before the target is touched and
/// before each row; an aborted render leaves the target partially painted and
/// never reports 100.
#[tracing::instrument(level = "debug", skip_all, fields(mode = %options.mode, columns = options.columns))]
pub fn render_with_progress<I, S>(
    image: &I,
    target: &mut S,
    options: &RenderOptions,
    on_progress: &mut dyn FnMut(u8),
    cancel: &CancelToken,
) -> GlyphResult<RenderReport>
where
    I: ImageSource + ?Sized,
    S: Surface + ?Sized,
{
    cancel.check()?;
    options.validate()?;
    let (image_width, image_height) = image.dimensions();
    if image_width == 0 || image_height == 0 {
        return Err(GlyphError::invalid_input("image has zero width or height"));
    }

    let glyphs = options.glyph_set();
    let geometry = resolve(image_width, image_height, options, &glyphs, target);
    let grid = sample(
        image,
        geometry.columns,
        geometry.rows,
        Adjustments::from_options(options),
    )?;
    debug!(
        columns = geometry.columns,
        rows = geometry.rows,
        cell_width = geometry.cell_width,
        cell_height = geometry.cell_height,
        "resolved cell geometry"
    );

    let (canvas_width, canvas_height) = geometry.canvas_size();
    target.resize(canvas_width, canvas_height)?;
    match options.background {
        Background::Solid(color) => target.fill_rect(
            0.0,
            0.0,
            canvas_width as f32,
            canvas_height as f32,
            color,
        )?,
        Background::Transparent => {
            target.clear_rect(0.0, 0.0, canvas_width as f32, canvas_height as f32)?
        }
    }

    let mapper = GlyphMapper::new(options, &glyphs);
    let paint_font = options.paint_font();
    let shadow = options.shadow();
    let mut style = StyleState::default();
    let mut painted_cells = 0;
    let mut skipped_cells = 0;

    for y in 0..geometry.rows {
        if let Err(error) = cancel.check() {
            info!(row = y, rows = geometry.rows, "render aborted");
            return Err(error);
        }

        for x in 0..geometry.columns {
            match mapper.pick(grid.pixel(x, y), x, y) {
                CellDecision::Skip => skipped_cells += 1,
                CellDecision::Paint { glyph, color } => {
                    style.apply(target, color, shadow, &paint_font)?;
                    let (px, py) = geometry.cell_origin(x, y);
                    target.fill_text(glyph, px, py)?;
                    painted_cells += 1;
                }
            }
        }

        if y % ROW_BATCH == 0 {
            on_progress(batch_progress(y, geometry.rows));
            thread::yield_now();
        }
    }

    on_progress(100);
    debug!(painted_cells, skipped_cells, "render complete");
    Ok(RenderReport {
        geometry,
        painted_cells,
        skipped_cells,
    })
}

/// Percent reported after row `y`; 100 is reserved for completion.
pub fn batch_progress(y: u32, rows: u32) -> u8 {
    let percent = (y as f64 / rows.max(1) as f64 * 100.0).round();
    percent.clamp(0.0, 99.0) as u8
}

/// Last fill, shadow and font handed to the target. Only differences are re-issued.
#[derive(Debug, Default)]
struct StyleState {
    fill: Option<Rgb>,
    shadow: Option<Option<Shadow>>,
    font: Option<FontSpec>,
}

impl StyleState {
    fn apply<S: Surface + ?Sized>(
        &mut self,
        target: &mut S,
        fill: Rgb,
        shadow: Option<Shadow>,
        font: &FontSpec,
    ) -> GlyphResult<()> {
        if self.fill != Some(fill) {
            target.set_fill(fill);
            self.fill = Some(fill);
        }
        if self.shadow != Some(shadow) {
            target.set_shadow(shadow);
            self.shadow = Some(shadow);
        }
        if self.font.as_ref() != Some(font) {
            target.set_font(font)?;
            self.font = Some(font.clone());
        }
        Ok(())
    }
}

/// Finished background render: the painted target and its report.
#[derive(Debug)]
pub struct RenderOutcome<S> {
    pub surface: S,
    pub report: RenderReport,
}

/// A render running on its own thread.
///
/// Progress percentages arrive on [`RenderHandle::progress`]; the channel
/// closes when the worker finishes, succeeds or not.
pub struct RenderHandle<S> {
    progress: Receiver<u8>,
    cancel: CancelToken,
    worker: Option<JoinHandle<GlyphResult<RenderOutcome<S>>>>,
}

impl<S> RenderHandle<S> {
    pub fn progress(&self) -> &Receiver<u8> {
        &self.progress
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(true, |worker| worker.is_finished())
    }

    pub fn join(mut self) -> GlyphResult<RenderOutcome<S>> {
        let Some(worker) = self.worker.take() else {
            return Err(GlyphError::render("render worker already joined"));
        };
        match worker.join() {
            Ok(result) => result,
            Err(_) => Err(GlyphError::render("render worker panicked")),
        }
    }
}

/// Start rendering `image` into `surface` on a named worker thread.
pub fn spawn_render<I, S>(image: I, mut surface: S, options: RenderOptions) -> GlyphResult<RenderHandle<S>>
where
    I: ImageSource + Send + 'static,
    S: Surface + Send + 'static,
{
    let (sender, receiver) = mpsc::channel::<u8>();
    let cancel = CancelToken::new();
    let token = cancel.clone();

    let worker = thread::Builder::new()
        .name("glyphcast-render".to_owned())
        .spawn(move || -> GlyphResult<RenderOutcome<S>> {
            let mut forward = |percent: u8| {
                // A dropped receiver only means nobody is watching.
                let _ = sender.send(percent);
            };
            let report = render_with_progress(&image, &mut surface, &options, &mut forward, &token)?;
            Ok(RenderOutcome { surface, report })
        })
        .map_err(|error| GlyphError::render(format!("failed to spawn render worker: {error}")))?;

    Ok(RenderHandle {
        progress: receiver,
        cancel,
        worker: Some(worker),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_progress_never_reports_completion() {
        assert_eq!(batch_progress(0, 30), 0);
        assert_eq!(batch_progress(10, 30), 33);
        assert_eq!(batch_progress(20, 30), 67);
        assert_eq!(batch_progress(499, 500), 99);
        assert_eq!(batch_progress(0, 0), 0);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
        assert_eq!(observer.check(), Err(GlyphError::Aborted));
    }
}
