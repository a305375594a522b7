use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};

use crate::surface::FontSpec;

/// Loaded font faces addressed by CSS family name.
///
/// Family keys are lowercased. A bold variant is registered as `"<family> bold"`.
#[derive(Clone, Default)]
pub struct FontBook {
    default: Option<Arc<Font>>,
    emoji: Option<Arc<Font>>,
    families: BTreeMap<String, Arc<Font>>,
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_font(path: &Path) -> Result<Arc<Font>> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font file {}", path.display()))?;
        Self::parse_font(bytes, &path.display().to_string())
    }

    pub fn parse_font(bytes: Vec<u8>, label: &str) -> Result<Arc<Font>> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font {label}: {error}"))?;
        Ok(Arc::new(font))
    }

    pub fn set_default(&mut self, font: Arc<Font>) {
        self.default = Some(font);
    }

    pub fn set_emoji(&mut self, font: Arc<Font>) {
        self.emoji = Some(font);
    }

    pub fn insert_family(&mut self, name: &str, font: Arc<Font>) {
        self.families.insert(family_key(name), font);
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.emoji.is_none() && self.families.is_empty()
    }

    pub fn family_names(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }

    pub fn emoji(&self) -> Option<&Arc<Font>> {
        self.emoji.as_ref()
    }

    /// Face for `spec`: bold variant, then the family, then the default face.
    pub fn resolve(&self, spec: &FontSpec) -> Option<Arc<Font>> {
        let family = family_key(&spec.family);
        let bold = spec
            .is_bold()
            .then(|| self.families.get(&format!("{family} bold")))
            .flatten();
        bold.or_else(|| self.families.get(&family))
            .or(self.default.as_ref())
            .cloned()
    }
}

impl fmt::Debug for FontBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontBook")
            .field("default", &self.default.is_some())
            .field("emoji", &self.emoji.is_some())
            .field("families", &self.families.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn family_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Chars of `text` that `font` has no glyph for. Joiners and variation selectors are ignored.
pub fn missing_codepoints(font: &Font, text: &str) -> Vec<char> {
    text.chars()
        .filter(|ch| !matches!(ch, '\u{FE0E}' | '\u{FE0F}' | '\u{200D}') && !ch.is_control())
        .filter(|ch| font.lookup_glyph_index(*ch) == 0)
        .collect()
}
