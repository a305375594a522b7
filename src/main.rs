use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use glyphcast::analytics::{self, AnalyticsEvent, EventStore, GenerationEvent};
use glyphcast::config::AppConfig;
use glyphcast::error::{find_glyph_error, ErrorEnvelope, GlyphError};
use glyphcast::presets::PresetDefinition;
use glyphcast::{
    export_text, spawn_render, ArtMode, Background, PixmapSurface, RenderOptions,
    RenderOverrides, Rgb,
};

#[derive(Debug, Parser)]
#[command(name = "glyphcast", version = env!("GLYPHCAST_BUILD_VERSION"))]
#[command(about = "Re-render images as grids of words, ASCII ramps or emoji")]
struct Cli {
    /// YAML config file; falls back to $GLYPHCAST_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print results and errors as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render an image to a PNG.
    Render {
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[command(flatten)]
        style: StyleArgs,
    },
    /// Export the glyph grid as plain text.
    Text {
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[command(flatten)]
        style: StyleArgs,
    },
    /// List the preset catalog.
    Presets,
    /// Record or summarize analytics events.
    Analytics {
        #[command(subcommand)]
        command: AnalyticsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum AnalyticsCommand {
    /// Normalize a JSON event payload and append it to the store.
    Record {
        payload: String,
        #[arg(long)]
        store: Option<PathBuf>,
        /// Override "now" in epoch milliseconds.
        #[arg(long)]
        now: Option<i64>,
    },
    /// Print counts and trends for a time range ending now.
    Summary {
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long = "range-ms")]
        range_ms: Option<i64>,
        #[arg(long)]
        now: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Mosaic,
    Ascii,
    Emoji,
}

impl From<ModeArg> for ArtMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Mosaic => ArtMode::Mosaic,
            ModeArg::Ascii => ArtMode::Ascii,
            ModeArg::Emoji => ArtMode::Emoji,
        }
    }
}

#[derive(Debug, Args)]
struct StyleArgs {
    /// Start from a preset; explicit flags still win.
    #[arg(long)]
    preset: Option<String>,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    #[arg(long)]
    glyphs: Option<String>,
    #[arg(long)]
    columns: Option<u32>,
    #[arg(long)]
    colorize: Option<bool>,
    /// `#rrggbb` or `transparent`.
    #[arg(long, value_parser = parse_background)]
    background: Option<Background>,
    #[arg(long = "text-color", value_parser = parse_color)]
    text_color: Option<Rgb>,
    #[arg(long)]
    brightness: Option<f32>,
    #[arg(long)]
    contrast: Option<f32>,
    #[arg(long)]
    saturation: Option<f32>,
    #[arg(long)]
    invert: Option<bool>,
    #[arg(long = "font-family")]
    font_family: Option<String>,
    #[arg(long = "font-weight")]
    font_weight: Option<String>,
    #[arg(long = "font-size")]
    font_size: Option<f32>,
    #[arg(long)]
    spacing: Option<f32>,
    #[arg(long)]
    threshold: Option<u8>,
    #[arg(long = "shadow-blur")]
    shadow_blur: Option<f32>,
    #[arg(long = "shadow-color", value_parser = parse_color)]
    shadow_color: Option<Rgb>,
}

impl StyleArgs {
    fn overrides(&self) -> RenderOverrides {
        RenderOverrides {
            mode: None,
            glyphs: self.glyphs.clone(),
            columns: self.columns,
            colorize: self.colorize,
            background: self.background,
            text_color: self.text_color,
            brightness: self.brightness,
            contrast: self.contrast,
            saturation: self.saturation,
            invert: self.invert,
            font_family: self.font_family.clone(),
            font_weight: self.font_weight.clone(),
            font_size_px: self.font_size,
            spacing: self.spacing,
            threshold: self.threshold,
            shadow_blur_px: self.shadow_blur,
            shadow_color: self.shadow_color,
        }
    }

    /// Config defaults, then the preset, then the mode switch, then explicit flags.
    fn resolve(&self, config: &AppConfig) -> Result<(RenderOptions, Option<PresetDefinition>)> {
        let mut options = config.base_options();
        let mut preset = None;
        if let Some(id) = &self.preset {
            let catalog = config.preset_catalog();
            options = catalog.apply(id, &options)?;
            preset = catalog.get(id).cloned();
        }
        if let Some(mode) = self.mode.map(ArtMode::from) {
            if mode != options.mode {
                options.switch_mode(mode);
            }
        }
        self.overrides().apply_to(&mut options);
        options.validate()?;
        Ok((options, preset))
    }
}

fn parse_color(value: &str) -> Result<Rgb, String> {
    Rgb::parse(value).map_err(|error| error.to_string())
}

fn parse_background(value: &str) -> Result<Background, String> {
    Background::parse(value).map_err(|error| error.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::discover(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            init_tracing(None);
            return report_failure(&error, cli.json);
        }
    };
    init_tracing(config.log_filter.as_deref());

    let result = match &cli.command {
        Commands::Render {
            input,
            output,
            style,
        } => run_render(&config, input, output, style, cli.json),
        Commands::Text {
            input,
            output,
            style,
        } => run_text(&config, input, output.as_deref(), style, cli.json),
        Commands::Presets => run_presets(&config, cli.json),
        Commands::Analytics { command } => run_analytics(&config, command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_failure(&error, cli.json),
    }
}

/// `RUST_LOG`, else the config's `log_filter`, else `info`. Logs go to stderr.
fn init_tracing(config_filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config_filter.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report_failure(error: &anyhow::Error, as_json: bool) -> ExitCode {
    if as_json {
        match serde_json::to_string(&ErrorEnvelope::from_anyhow(error)) {
            Ok(line) => println!("{line}"),
            Err(_) => eprintln!("error: {error:#}"),
        }
    } else {
        eprintln!("error: {error:#}");
        if let Some(hint) = find_glyph_error(error).and_then(GlyphError::hint) {
            eprintln!("hint: {hint}");
        }
    }
    ExitCode::FAILURE
}

fn run_render(
    config: &AppConfig,
    input: &Path,
    output: &Path,
    style: &StyleArgs,
    as_json: bool,
) -> Result<()> {
    let (options, preset) = style.resolve(config)?;
    let image =
        image::open(input).with_context(|| format!("failed to decode {}", input.display()))?;
    let surface = PixmapSurface::new(config.font_book()?)?;

    let handle = spawn_render(image, surface, options.clone())?;
    let mut last_logged: Option<u8> = None;
    for percent in handle.progress().iter() {
        if last_logged.map_or(true, |last| percent >= last.saturating_add(25) || percent == 100) {
            info!(percent, "rendering {}", input.display());
            last_logged = Some(percent);
        }
    }
    let outcome = handle
        .join()
        .with_context(|| format!("failed to render {}", input.display()))?;
    outcome.surface.save_png(output)?;
    record_generation(config, &options, preset.as_ref());

    let geometry = outcome.report.geometry;
    let (width, height) = geometry.canvas_size();
    if as_json {
        println!(
            "{}",
            json!({
                "ok": true,
                "output": output,
                "columns": geometry.columns,
                "rows": geometry.rows,
                "width": width,
                "height": height,
            })
        );
    } else {
        println!(
            "Wrote {} ({}x{} cells, {}x{} px)",
            output.display(),
            geometry.columns,
            geometry.rows,
            width,
            height
        );
    }
    Ok(())
}

fn run_text(
    config: &AppConfig,
    input: &Path,
    output: Option<&Path>,
    style: &StyleArgs,
    as_json: bool,
) -> Result<()> {
    let (options, _) = style.resolve(config)?;
    let image =
        image::open(input).with_context(|| format!("failed to decode {}", input.display()))?;
    let mut measure = PixmapSurface::new(config.font_book()?)?;
    let text = export_text(&image, &options, &mut measure)
        .with_context(|| format!("failed to export {}", input.display()))?;

    match output {
        Some(path) => {
            fs::write(path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if as_json {
                println!("{}", json!({ "ok": true, "output": path }));
            } else {
                println!("Wrote {}", path.display());
            }
        }
        None if as_json => println!("{}", json!({ "ok": true, "text": text })),
        None => print!("{text}"),
    }
    Ok(())
}

fn run_presets(config: &AppConfig, as_json: bool) -> Result<()> {
    let catalog = config.preset_catalog();
    if as_json {
        let presets: Vec<&PresetDefinition> = catalog.iter().collect();
        println!("{}", serde_json::to_string_pretty(&presets)?);
        return Ok(());
    }
    for preset in catalog.iter() {
        let mode = preset.options.mode.unwrap_or_default();
        println!("{:<12} {:<14} {}", preset.id, preset.label, mode);
    }
    Ok(())
}

fn run_analytics(config: &AppConfig, command: &AnalyticsCommand) -> Result<()> {
    match command {
        AnalyticsCommand::Record {
            payload,
            store,
            now,
        } => {
            let mut store = EventStore::open(&store_path(config, store.as_deref())?)?;
            let body: serde_json::Value =
                serde_json::from_str(payload).context("analytics payload is not valid JSON")?;
            let event = AnalyticsEvent::from_payload(&body, now.unwrap_or_else(analytics::now_ms))?;
            let recorded = store.record(event)?;
            println!("{}", json!({ "ok": true, "recorded": recorded }));
        }
        AnalyticsCommand::Summary {
            store,
            range_ms,
            now,
        } => {
            let store = EventStore::open(&store_path(config, store.as_deref())?)?;
            let range_ms = analytics::clamp_range_ms(*range_ms);
            let summary = store.summary(range_ms, now.unwrap_or_else(analytics::now_ms));
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

fn store_path(config: &AppConfig, explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit.or_else(|| config.analytics_store()) {
        Some(path) => Ok(path.to_path_buf()),
        None => bail!("no analytics store configured; pass --store or set analytics.store"),
    }
}

/// Best effort: a failed write is logged and the render still succeeds.
fn record_generation(config: &AppConfig, options: &RenderOptions, preset: Option<&PresetDefinition>) {
    let Some(path) = config.analytics_store() else {
        return;
    };
    let style = preset.map(|preset| (preset.id.as_str(), preset.label.as_str()));
    let event = GenerationEvent::new(options.mode, style, config.client_id(), analytics::now_ms());
    let recorded = EventStore::open(path)
        .and_then(|mut store| store.record(AnalyticsEvent::Generation(event)));
    if let Err(error) = recorded {
        warn!(error = %format!("{error:#}"), "failed to record generation event");
    }
}
