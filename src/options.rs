use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GlyphError, GlyphResult};
use crate::surface::{FontSpec, Shadow};

/// Glyph-selection policy for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtMode {
    /// Glyph chosen by cell position only.
    #[default]
    Mosaic,
    /// Glyph chosen by luminance over a character ramp.
    Ascii,
    /// Same luminance rule as ascii, painted with the emoji font.
    Emoji,
}

impl ArtMode {
    pub const ALL: [ArtMode; 3] = [ArtMode::Mosaic, ArtMode::Ascii, ArtMode::Emoji];

    pub fn from_keyword(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mosaic" | "word" => Some(Self::Mosaic),
            "ascii" => Some(Self::Ascii),
            "emoji" => Some(Self::Emoji),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Mosaic => "mosaic",
            Self::Ascii => "ascii",
            Self::Emoji => "emoji",
        }
    }

    /// Glyph sequence a fresh selection of this mode starts from.
    pub fn default_glyphs(self) -> &'static str {
        match self {
            Self::Mosaic => "ART ",
            Self::Ascii => " .:-=+*#%@",
            Self::Emoji => "🌑🌒🌓🌔🌕",
        }
    }

    pub fn default_colorize(self) -> bool {
        matches!(self, Self::Mosaic)
    }
}

impl fmt::Display for ArtMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Opaque 8-bit color, written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb` or `#rrggbb` (the leading `#` is optional).
    pub fn parse(value: &str) -> GlyphResult<Self> {
        let trimmed = value.trim();
        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        let invalid = || GlyphError::invalid_input(format!("invalid color '{value}'"));
        if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let expand = |index: usize| channel(&hex[index..index + 1].repeat(2));
                Ok(Self::new(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Ok(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            _ => Err(invalid()),
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl FromStr for Rgb {
    type Err = GlyphError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Rgb {
    type Error = GlyphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Canvas fill behind the glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Background {
    /// No fill; the canvas is cleared to zero alpha.
    Transparent,
    Solid(Rgb),
}

impl Background {
    pub fn parse(value: &str) -> GlyphResult<Self> {
        if value.trim().eq_ignore_ascii_case("transparent") {
            Ok(Self::Transparent)
        } else {
            Rgb::parse(value).map(Self::Solid)
        }
    }

    pub fn is_transparent(self) -> bool {
        matches!(self, Self::Transparent)
    }
}

impl Default for Background {
    fn default() -> Self {
        Self::Solid(Rgb::BLACK)
    }
}

impl FromStr for Background {
    type Err = GlyphError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Background {
    type Error = GlyphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Background> for String {
    fn from(value: Background) -> Self {
        match value {
            Background::Transparent => "transparent".to_owned(),
            Background::Solid(color) => color.to_hex(),
        }
    }
}

/// Which measurement glyph a glyph set needs. Decided once per options value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphClass {
    Text,
    Emoji,
}

impl GlyphClass {
    pub fn detect(raw: &str) -> Self {
        static EMOJI_RANGE: OnceLock<Regex> = OnceLock::new();
        let pattern = EMOJI_RANGE
            .get_or_init(|| Regex::new(r"[\x{1F300}-\x{1F9FF}]").expect("emoji range pattern"));
        if pattern.is_match(raw) {
            Self::Emoji
        } else {
            Self::Text
        }
    }

    /// Representative glyph measured to size a cell.
    pub fn measure_glyph(self) -> &'static str {
        match self {
            Self::Text => "M",
            Self::Emoji => "😀",
        }
    }
}

/// Ordered, non-empty glyph sequence. Index 0 is the darkest/first glyph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphSet {
    glyphs: Vec<String>,
    class: GlyphClass,
}

impl GlyphSet {
    /// Split `raw` into glyphs. An empty string becomes a single space.
    pub fn parse(raw: &str) -> Self {
        let mut glyphs: Vec<String> = Vec::new();
        let mut joined = false;
        for ch in raw.chars() {
            let attaches = joined || is_glyph_modifier(ch);
            match glyphs.last_mut() {
                Some(last) if attaches => last.push(ch),
                _ => glyphs.push(ch.to_string()),
            }
            joined = ch == '\u{200D}';
        }
        if glyphs.is_empty() {
            glyphs.push(" ".to_owned());
        }

        Self {
            glyphs,
            class: GlyphClass::detect(raw),
        }
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn class(&self) -> GlyphClass {
        self.class
    }

    pub fn glyphs(&self) -> &[String] {
        &self.glyphs
    }

    /// Glyph at `index`, clamped to the last glyph.
    pub fn get(&self, index: usize) -> &str {
        &self.glyphs[index.min(self.glyphs.len() - 1)]
    }
}

fn is_glyph_modifier(ch: char) -> bool {
    matches!(ch, '\u{FE0E}' | '\u{FE0F}' | '\u{200D}' | '\u{1F3FB}'..='\u{1F3FF}')
}

/// Caller-supplied options for one render or text export. Immutable for the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    pub mode: ArtMode,
    pub glyphs: String,
    /// Target grid width in cells.
    pub columns: u32,
    /// Tint each glyph with its source pixel instead of `text_color`.
    pub colorize: bool,
    pub background: Background,
    pub text_color: Rgb,
    /// Percent, 100 = identity.
    pub brightness: f32,
    /// Percent, 100 = identity.
    pub contrast: f32,
    /// Percent, 100 = identity.
    pub saturation: f32,
    pub invert: bool,
    pub font_family: String,
    pub font_weight: String,
    pub font_size_px: f32,
    /// Multiplier on the measured cell width and height.
    pub spacing: f32,
    /// Minimum luminance for a glyph in ascii/emoji modes.
    pub threshold: u8,
    pub shadow_blur_px: f32,
    /// Glow color; falls back to `text_color`.
    pub shadow_color: Option<Rgb>,
}

pub const DEFAULT_FONT_SIZE_PX: f32 = 12.0;

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            mode: ArtMode::Mosaic,
            glyphs: ArtMode::Mosaic.default_glyphs().to_owned(),
            columns: 120,
            colorize: true,
            background: Background::Solid(Rgb::BLACK),
            text_color: Rgb::WHITE,
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            invert: false,
            font_family: "monospace".to_owned(),
            font_weight: "normal".to_owned(),
            font_size_px: DEFAULT_FONT_SIZE_PX,
            spacing: 1.0,
            threshold: 0,
            shadow_blur_px: 0.0,
            shadow_color: Some(Rgb::WHITE),
        }
    }
}

impl RenderOptions {
    /// Defaults with the glyphs and colorize setting of `mode`.
    pub fn for_mode(mode: ArtMode) -> Self {
        let mut options = Self::default();
        options.switch_mode(mode);
        options
    }

    pub fn switch_mode(&mut self, mode: ArtMode) {
        self.mode = mode;
        self.glyphs = mode.default_glyphs().to_owned();
        self.colorize = mode.default_colorize();
    }

    pub fn validate(&self) -> GlyphResult<()> {
        if self.columns == 0 {
            return Err(GlyphError::invalid_input("columns must be at least 1"));
        }
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
            ("spacing", self.spacing),
            ("fontSizePx", self.font_size_px),
            ("shadowBlurPx", self.shadow_blur_px),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(GlyphError::invalid_input(format!(
                    "{name} must be a finite, non-negative number (got {value})"
                )));
            }
        }
        Ok(())
    }

    pub fn glyph_set(&self) -> GlyphSet {
        GlyphSet::parse(&self.glyphs)
    }

    /// A zero spacing means "unset" and behaves as 1.0.
    pub fn effective_spacing(&self) -> f32 {
        if self.spacing.is_finite() && self.spacing > 0.0 {
            self.spacing
        } else {
            1.0
        }
    }

    pub fn effective_font_size(&self) -> f32 {
        if self.font_size_px.is_finite() && self.font_size_px > 0.0 {
            self.font_size_px
        } else {
            DEFAULT_FONT_SIZE_PX
        }
    }

    /// Font used to measure cells.
    pub fn font(&self) -> FontSpec {
        FontSpec::new(
            &self.font_family,
            &self.font_weight,
            self.effective_font_size(),
        )
    }

    /// Font used to paint glyphs. Emoji are painted with the generic sans-serif face.
    pub fn paint_font(&self) -> FontSpec {
        match self.mode {
            ArtMode::Emoji => FontSpec::new("sans-serif", "normal", self.effective_font_size()),
            ArtMode::Mosaic | ArtMode::Ascii => self.font(),
        }
    }

    pub fn shadow(&self) -> Option<Shadow> {
        (self.shadow_blur_px > 0.0).then(|| Shadow {
            blur_px: self.shadow_blur_px,
            color: self.shadow_color.unwrap_or(self.text_color),
        })
    }

    pub fn with_overrides(&self, overrides: &RenderOverrides) -> Self {
        let mut options = self.clone();
        overrides.apply_to(&mut options);
        options
    }
}

/// Partial [`RenderOptions`]; every present field replaces the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RenderOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ArtMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glyphs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorize: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invert: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size_px: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_blur_px: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_color: Option<Rgb>,
}

impl RenderOverrides {
    pub fn apply_to(&self, options: &mut RenderOptions) {
        if let Some(mode) = self.mode {
            options.mode = mode;
        }
        if let Some(glyphs) = &self.glyphs {
            options.glyphs = glyphs.clone();
        }
        if let Some(columns) = self.columns {
            options.columns = columns;
        }
        if let Some(colorize) = self.colorize {
            options.colorize = colorize;
        }
        if let Some(background) = self.background {
            options.background = background;
        }
        if let Some(text_color) = self.text_color {
            options.text_color = text_color;
        }
        if let Some(brightness) = self.brightness {
            options.brightness = brightness;
        }
        if let Some(contrast) = self.contrast {
            options.contrast = contrast;
        }
        if let Some(saturation) = self.saturation {
            options.saturation = saturation;
        }
        if let Some(invert) = self.invert {
            options.invert = invert;
        }
        if let Some(font_family) = &self.font_family {
            options.font_family = font_family.clone();
        }
        if let Some(font_weight) = &self.font_weight {
            options.font_weight = font_weight.clone();
        }
        if let Some(font_size_px) = self.font_size_px {
            options.font_size_px = font_size_px;
        }
        if let Some(spacing) = self.spacing {
            options.spacing = spacing;
        }
        if let Some(threshold) = self.threshold {
            options.threshold = threshold;
        }
        if let Some(shadow_blur_px) = self.shadow_blur_px {
            options.shadow_blur_px = shadow_blur_px;
        }
        if let Some(shadow_color) = self.shadow_color {
            options.shadow_color = Some(shadow_color);
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
