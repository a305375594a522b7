use serde::{Deserialize, Serialize};

use crate::error::{GlyphError, GlyphResult};
use crate::options::{ArtMode, Background, RenderOptions, RenderOverrides, Rgb};

/// A named style: overrides applied on top of the preset base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PresetDefinition {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub options: RenderOverrides,
}

/// Ordered set of presets, addressed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetCatalog {
    presets: Vec<PresetDefinition>,
}

impl PresetCatalog {
    pub fn builtin() -> Self {
        Self {
            presets: builtin_presets(),
        }
    }

    /// Add `definitions`, replacing any preset with the same id in place.
    pub fn with_definitions(mut self, definitions: &[PresetDefinition]) -> Self {
        for definition in definitions {
            match self.presets.iter_mut().find(|preset| preset.id == definition.id) {
                Some(existing) => *existing = definition.clone(),
                None => self.presets.push(definition.clone()),
            }
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&PresetDefinition> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresetDefinition> {
        self.presets.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.presets.iter().map(|preset| preset.id.as_str()).collect()
    }

    /// `current` reset to the preset base, then the preset's own overrides.
    ///
    /// Fields neither touches (e.g. font size, shadow color) carry over from `current`.
    pub fn apply(&self, id: &str, current: &RenderOptions) -> GlyphResult<RenderOptions> {
        let preset = self.get(id).ok_or_else(|| {
            GlyphError::invalid_input(format!(
                "unknown preset '{id}'. Allowed: {}",
                self.ids().join(", ")
            ))
        })?;
        Ok(current
            .with_overrides(&preset_base())
            .with_overrides(&preset.options))
    }
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Reset applied before every preset.
pub fn preset_base() -> RenderOverrides {
    RenderOverrides {
        brightness: Some(100.0),
        contrast: Some(100.0),
        saturation: Some(100.0),
        invert: Some(false),
        colorize: Some(false),
        columns: Some(140),
        font_family: Some("monospace".to_owned()),
        font_weight: Some("bold".to_owned()),
        threshold: Some(0),
        spacing: Some(1.0),
        shadow_blur_px: Some(0.0),
        ..RenderOverrides::default()
    }
}

fn preset(id: &str, label: &str, mode: ArtMode, glyphs: &str, background: &str) -> PresetDefinition {
    PresetDefinition {
        id: id.to_owned(),
        label: label.to_owned(),
        options: RenderOverrides {
            mode: Some(mode),
            glyphs: Some(glyphs.to_owned()),
            background: Some(Background::Solid(hex(background))),
            ..RenderOverrides::default()
        },
    }
}

fn hex(value: &str) -> Rgb {
    Rgb::parse(value).unwrap_or(Rgb::BLACK)
}

fn builtin_presets() -> Vec<PresetDefinition> {
    let mut matrix = preset(
        "matrix",
        "Matrix Rain",
        ArtMode::Ascii,
        "      .:-+=;ﾘｹﾒｶﾀｼﾂﾃﾄﾅﾆﾇﾈﾉﾊﾋﾌﾍﾎﾏﾐﾑﾒﾓﾔﾕﾖﾗﾘﾙﾚﾛﾜﾝ",
        "#000000",
    );
    matrix.options.text_color = Some(hex("#00ff41"));
    matrix.options.brightness = Some(110.0);
    matrix.options.contrast = Some(220.0);
    matrix.options.shadow_blur_px = Some(4.0);
    matrix.options.shadow_color = Some(hex("#00ff41"));
    matrix.options.threshold = Some(40);
    matrix.options.spacing = Some(1.2);

    let mut cyberpunk = preset("cyberpunk", "Cyberpunk", ArtMode::Ascii, "░▒▓█", "#05000a");
    cyberpunk.options.colorize = Some(true);
    cyberpunk.options.contrast = Some(170.0);
    cyberpunk.options.saturation = Some(180.0);
    cyberpunk.options.shadow_blur_px = Some(10.0);
    cyberpunk.options.shadow_color = Some(hex("#ff00ff"));

    let mut blueprint = preset("blueprint", "Blueprint", ArtMode::Ascii, " .|+*#", "#0a3d91");
    blueprint.options.text_color = Some(Rgb::WHITE);
    blueprint.options.invert = Some(true);
    blueprint.options.contrast = Some(130.0);

    let mut newspaper = preset(
        "newspaper",
        "Newspaper",
        ArtMode::Ascii,
        " .,:;irsXA253hMHGS#9B&@",
        "#f4f4f0",
    );
    newspaper.options.text_color = Some(hex("#111111"));
    newspaper.options.invert = Some(true);
    newspaper.options.font_family = Some("serif".to_owned());
    newspaper.options.contrast = Some(140.0);
    newspaper.options.saturation = Some(0.0);

    let mut retro = preset("retro-game", "Retro Game", ArtMode::Mosaic, "■□", "#000000");
    retro.options.colorize = Some(true);
    retro.options.columns = Some(80);
    retro.options.contrast = Some(160.0);

    let mut braille = preset("braille", "Braille Art", ArtMode::Ascii, " ⠁⠃⠇⡇⣇⣧⣷⣿", "#000000");
    braille.options.colorize = Some(true);

    let mut binary = preset("binary", "Binary", ArtMode::Ascii, "01", "#000000");
    binary.options.text_color = Some(Rgb::WHITE);
    binary.options.contrast = Some(200.0);

    let hearts = preset(
        "hearts",
        "Emoji Hearts",
        ArtMode::Emoji,
        "🖤🤎❤️🧡💛💚💙💜🤍",
        "#000000",
    );

    let mut terminal = preset("terminal", "Terminal", ArtMode::Ascii, " #_@", "#000000");
    terminal.options.text_color = Some(hex("#00ff00"));
    terminal.options.font_family = Some("monospace".to_owned());
    terminal.options.contrast = Some(150.0);

    let mut gold = preset("gold", "Gold Luxury", ArtMode::Ascii, " .:+*#%@", "#1a1a1a");
    gold.options.text_color = Some(hex("#ffd700"));
    gold.options.shadow_blur_px = Some(8.0);
    gold.options.shadow_color = Some(hex("#ffd700"));
    gold.options.contrast = Some(130.0);

    let mut vaporwave = preset("vaporwave", "Vaporwave", ArtMode::Ascii, "░▒▓█", "#2d004d");
    vaporwave.options.colorize = Some(true);
    vaporwave.options.saturation = Some(200.0);
    vaporwave.options.contrast = Some(150.0);
    vaporwave.options.shadow_blur_px = Some(15.0);
    vaporwave.options.shadow_color = Some(hex("#00ffff"));

    let mut sketch = preset("sketch", "Sketch", ArtMode::Ascii, " /\\|-_", "#ffffff");
    sketch.options.text_color = Some(Rgb::BLACK);
    sketch.options.invert = Some(true);
    sketch.options.contrast = Some(180.0);
    sketch.options.saturation = Some(0.0);

    vec![
        matrix, cyberpunk, blueprint, newspaper, retro, braille, binary, hearts, terminal, gold,
        vaporwave, sketch,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::GlyphClass;

    #[test]
    fn builtin_catalog_has_twelve_unique_presets() {
        let catalog = PresetCatalog::builtin();
        let mut ids = catalog.ids();
        assert_eq!(ids.len(), 12);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 12);
    }

    #[test]
    fn preset_base_resets_tone_and_layout() {
        let mut current = RenderOptions::default();
        current.brightness = 40.0;
        current.invert = true;
        current.font_size_px = 18.0;

        let options = PresetCatalog::builtin()
            .apply("braille", &current)
            .expect("braille exists");
        assert_eq!(options.mode, ArtMode::Ascii);
        assert_eq!(options.brightness, 100.0);
        assert!(!options.invert);
        assert!(options.colorize);
        assert_eq!(options.columns, 140);
        assert_eq!(options.font_weight, "bold");
        assert_eq!(options.font_size_px, 18.0);
    }

    #[test]
    fn matrix_carries_glow_and_threshold() {
        let options = PresetCatalog::builtin()
            .apply("matrix", &RenderOptions::default())
            .expect("matrix exists");
        assert_eq!(options.threshold, 40);
        assert_eq!(options.spacing, 1.2);
        let shadow = options.shadow().expect("matrix has a glow");
        assert_eq!(shadow.blur_px, 4.0);
        assert_eq!(shadow.color, Rgb::new(0x00, 0xff, 0x41));
    }

    #[test]
    fn hearts_preset_is_emoji() {
        let options = PresetCatalog::builtin()
            .apply("hearts", &RenderOptions::default())
            .expect("hearts exists");
        assert_eq!(options.mode, ArtMode::Emoji);
        let glyphs = options.glyph_set();
        assert_eq!(glyphs.len(), 9);
        assert_eq!(glyphs.class(), GlyphClass::Emoji);
    }

    #[test]
    fn unknown_preset_lists_allowed_ids() {
        let error = PresetCatalog::builtin()
            .apply("sepia", &RenderOptions::default())
            .expect_err("unknown id");
        assert_eq!(error.code(), "INVALID_INPUT");
        assert!(error.to_string().contains("vaporwave"));
    }

    #[test]
    fn definitions_replace_by_id_and_append_new_ones() {
        let custom = PresetDefinition {
            id: "binary".to_owned(),
            label: "Binary (green)".to_owned(),
            options: RenderOverrides {
                text_color: Some(Rgb::new(0, 255, 0)),
                ..RenderOverrides::default()
            },
        };
        let extra = PresetDefinition {
            id: "ink".to_owned(),
            label: "Ink".to_owned(),
            options: RenderOverrides::default(),
        };
        let catalog = PresetCatalog::builtin().with_definitions(&[custom, extra]);
        assert_eq!(catalog.ids().len(), 13);
        assert_eq!(catalog.ids()[6], "binary");
        assert_eq!(catalog.get("binary").map(|p| p.label.as_str()), Some("Binary (green)"));
        assert_eq!(catalog.ids().last(), Some(&"ink"));
    }
}
