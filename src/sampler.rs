use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};

use crate::error::{GlyphError, GlyphResult};
use crate::options::RenderOptions;

/// A decoded raster the sampler can read scaled pixels from.
pub trait ImageSource {
    fn dimensions(&self) -> (u32, u32);

    /// Whether tone adjustments can be applied to this source.
    fn supports_filters(&self) -> bool {
        true
    }

    /// Scale the whole image to exactly `width` x `height` straight-alpha RGBA.
    ///
    /// Sources whose pixels cannot be read back return [`GlyphError::Security`].
    fn read_scaled(&self, width: u32, height: u32) -> GlyphResult<RgbaImage>;
}

impl ImageSource for RgbaImage {
    fn dimensions(&self) -> (u32, u32) {
        GenericImageView::dimensions(self)
    }

    fn read_scaled(&self, width: u32, height: u32) -> GlyphResult<RgbaImage> {
        Ok(imageops::resize(self, width, height, FilterType::Triangle))
    }
}

impl ImageSource for DynamicImage {
    fn dimensions(&self) -> (u32, u32) {
        GenericImageView::dimensions(self)
    }

    fn read_scaled(&self, width: u32, height: u32) -> GlyphResult<RgbaImage> {
        Ok(imageops::resize(self, width, height, FilterType::Triangle))
    }
}

impl<T: ImageSource + ?Sized> ImageSource for std::sync::Arc<T> {
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn supports_filters(&self) -> bool {
        (**self).supports_filters()
    }

    fn read_scaled(&self, width: u32, height: u32) -> GlyphResult<RgbaImage> {
        (**self).read_scaled(width, height)
    }
}

/// Brightness, contrast and saturation in percent, applied in that order
/// with CSS filter-function math. 100 is identity for all three.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustments {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Adjustments {
    pub const IDENTITY: Adjustments = Adjustments {
        brightness: 100.0,
        contrast: 100.0,
        saturation: 100.0,
    };

    pub fn from_options(options: &RenderOptions) -> Self {
        Self {
            brightness: options.brightness,
            contrast: options.contrast,
            saturation: options.saturation,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn apply(&self, pixel: [u8; 4]) -> [u8; 4] {
        let brightness = self.brightness / 100.0;
        let contrast = self.contrast / 100.0;
        let s = self.saturation / 100.0;

        let mut rgb = [pixel[0], pixel[1], pixel[2]].map(|channel| channel as f32 / 255.0);
        if self.brightness != 100.0 {
            rgb = rgb.map(|v| (v * brightness).clamp(0.0, 1.0));
        }
        if self.contrast != 100.0 {
            rgb = rgb.map(|v| ((v - 0.5) * contrast + 0.5).clamp(0.0, 1.0));
        }
        if self.saturation != 100.0 {
            let [r, g, b] = rgb;
            rgb = [
                (0.213 + 0.787 * s) * r + (0.715 - 0.715 * s) * g + (0.072 - 0.072 * s) * b,
                (0.213 - 0.213 * s) * r + (0.715 + 0.285 * s) * g + (0.072 - 0.072 * s) * b,
                (0.213 - 0.213 * s) * r + (0.715 - 0.715 * s) * g + (0.072 + 0.928 * s) * b,
            ]
            .map(|v| v.clamp(0.0, 1.0));
        }

        let [r, g, b] = rgb.map(|v| (v * 255.0).round() as u8);
        [r, g, b, pixel[3]]
    }
}

/// Row-major RGBA samples, one per cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSample {
    columns: u32,
    rows: u32,
    pixels: Vec<[u8; 4]>,
}

impl GridSample {
    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels[y as usize * self.columns as usize + x as usize]
    }

    pub fn row(&self, y: u32) -> &[[u8; 4]] {
        let start = y as usize * self.columns as usize;
        &self.pixels[start..start + self.columns as usize]
    }
}

/// Scale `image` down to one pixel per cell and apply the tone adjustments.
#[tracing::instrument(level = "debug", skip(image))]
pub fn sample<I>(image: &I, columns: u32, rows: u32, adjustments: Adjustments) -> GlyphResult<GridSample>
where
    I: ImageSource + ?Sized,
{
    if columns == 0 || rows == 0 {
        return Err(GlyphError::invalid_input(format!(
            "sample grid must be at least 1x1 (got {columns}x{rows})"
        )));
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(GlyphError::invalid_input("image has zero width or height"));
    }

    let scaled = image.read_scaled(columns, rows)?;
    if scaled.dimensions() != (columns, rows) {
        return Err(GlyphError::render(format!(
            "image source returned {}x{} instead of {columns}x{rows}",
            scaled.width(),
            scaled.height()
        )));
    }

    let adjust = if adjustments.is_identity() {
        false
    } else if image.supports_filters() {
        true
    } else {
        tracing::warn!("image source does not support tone adjustments, sampling unfiltered");
        false
    };

    let pixels = scaled
        .pixels()
        .map(|pixel| if adjust { adjustments.apply(pixel.0) } else { pixel.0 })
        .collect();

    Ok(GridSample {
        columns,
        rows,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    struct Tainted;

    impl ImageSource for Tainted {
        fn dimensions(&self) -> (u32, u32) {
            (8, 8)
        }

        fn read_scaled(&self, _width: u32, _height: u32) -> GlyphResult<RgbaImage> {
            Err(GlyphError::security("cross-origin pixels"))
        }
    }

    struct Unfiltered(RgbaImage);

    impl ImageSource for Unfiltered {
        fn dimensions(&self) -> (u32, u32) {
            self.0.dimensions()
        }

        fn supports_filters(&self) -> bool {
            false
        }

        fn read_scaled(&self, width: u32, height: u32) -> GlyphResult<RgbaImage> {
            self.0.read_scaled(width, height)
        }
    }

    #[test]
    fn identity_adjustments_leave_pixels_alone() {
        let pixel = [12, 200, 99, 128];
        assert_eq!(Adjustments::IDENTITY.apply(pixel), pixel);
    }

    #[test]
    fn zero_saturation_produces_gray() {
        let adjustments = Adjustments {
            saturation: 0.0,
            ..Adjustments::IDENTITY
        };
        let [r, g, b, a] = adjustments.apply([255, 0, 0, 255]);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(r, 54);
        assert_eq!(a, 255);
    }

    #[test]
    fn brightness_and_contrast_clamp() {
        let brighter = Adjustments {
            brightness: 200.0,
            ..Adjustments::IDENTITY
        };
        assert_eq!(brighter.apply([200, 100, 0, 255]), [255, 200, 0, 255]);

        let flat = Adjustments {
            contrast: 0.0,
            ..Adjustments::IDENTITY
        };
        assert_eq!(flat.apply([0, 255, 30, 255]), [128, 128, 128, 255]);
    }

    #[test]
    fn uniform_image_samples_uniformly() {
        let image = RgbaImage::from_pixel(64, 32, Rgba([10, 20, 30, 255]));
        let grid = sample(&image, 8, 4, Adjustments::IDENTITY).expect("sample");
        assert_eq!(grid.columns(), 8);
        assert_eq!(grid.rows(), 4);
        assert!(grid.row(3).iter().all(|pixel| *pixel == [10, 20, 30, 255]));
    }

    #[test]
    fn readback_refusal_surfaces_as_security_error() {
        let error = sample(&Tainted, 4, 4, Adjustments::IDENTITY).expect_err("should refuse");
        assert_eq!(error.code(), "SECURITY_ERROR");
    }

    #[test]
    fn sources_without_filters_sample_raw_pixels() {
        let image = Unfiltered(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])));
        let adjustments = Adjustments {
            saturation: 0.0,
            ..Adjustments::IDENTITY
        };
        let grid = sample(&image, 2, 2, adjustments).expect("sample");
        assert_eq!(grid.pixel(1, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn cells_are_addressed_row_major() {
        let image = RgbaImage::from_fn(5, 3, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let grid = sample(&image, 5, 3, Adjustments::IDENTITY).expect("sample");
        assert_eq!(grid.pixel(4, 2), [4, 2, 0, 255]);
        assert_eq!(grid.row(1)[3], grid.pixel(3, 1));
    }

    #[test]
    fn zero_sized_grid_is_invalid() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        assert!(matches!(
            sample(&image, 0, 3, Adjustments::IDENTITY),
            Err(GlyphError::InvalidInput(_))
        ));
    }
}
