use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::fonts::FontBook;
use crate::options::{RenderOptions, RenderOverrides};
use crate::presets::{PresetCatalog, PresetDefinition};

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "GLYPHCAST_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontsConfig {
    pub default: Option<PathBuf>,
    pub emoji: Option<PathBuf>,
    /// Family name (optionally suffixed with ` bold`) to font file.
    pub families: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// JSON-lines event file. Analytics are off when unset.
    pub store: Option<PathBuf>,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub fonts: FontsConfig,
    pub defaults: RenderOverrides,
    pub presets: Vec<PresetDefinition>,
    pub analytics: AnalyticsConfig,
    pub log_filter: Option<String>,
}

impl AppConfig {
    /// `explicit`, else `$GLYPHCAST_CONFIG`, else built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
            Some(path) => Self::load(Path::new(&path))
                .with_context(|| format!("while loading config from ${CONFIG_ENV}")),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let base_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::parse(&contents, &base_dir)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parse YAML text; relative paths resolve against `base_dir`.
    pub fn parse(contents: &str, base_dir: &Path) -> Result<Self> {
        let mut config: AppConfig = serde_yaml::from_str(contents).map_err(|error| {
            let location = error
                .location()
                .map(|location| format!("line {}, column {}", location.line(), location.column()))
                .unwrap_or_else(|| "unknown location".to_owned());
            anyhow!("failed to parse yaml at {location}: {error}")
        })?;
        config.resolve_paths(base_dir);
        config.base_options().validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };
        if let Some(path) = self.fonts.default.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.fonts.emoji.as_mut() {
            resolve(path);
        }
        self.fonts.families.values_mut().for_each(resolve);
        if let Some(path) = self.analytics.store.as_mut() {
            resolve(path);
        }
    }

    /// Built-in defaults with the config's `defaults` applied.
    pub fn base_options(&self) -> RenderOptions {
        RenderOptions::default().with_overrides(&self.defaults)
    }

    pub fn preset_catalog(&self) -> PresetCatalog {
        PresetCatalog::builtin().with_definitions(&self.presets)
    }

    pub fn font_book(&self) -> Result<FontBook> {
        let mut book = FontBook::new();
        if let Some(path) = &self.fonts.default {
            book.set_default(FontBook::load_font(path)?);
        }
        if let Some(path) = &self.fonts.emoji {
            book.set_emoji(FontBook::load_font(path)?);
        }
        for (family, path) in &self.fonts.families {
            book.insert_family(family, FontBook::load_font(path)?);
        }
        Ok(book)
    }

    pub fn analytics_store(&self) -> Option<&Path> {
        self.analytics.store.as_deref()
    }

    pub fn client_id(&self) -> &str {
        self.analytics.client_id.as_deref().unwrap_or("cli")
    }
}
