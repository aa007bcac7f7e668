use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    task::Poll,
    time::{Duration, Instant},
};

use audio_visualiser_core::{
    decode_file_async, AppConfig, FrameScheduler, ManualScheduler, PacedScheduler, PixelSurface,
    PlaybackSource, RecordingSurface, Result, SignalAnalyzer, VisualiserError,
    VisualizationEngine, Visualize,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use image::{
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
    DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage,
};
use tracing_subscriber::EnvFilter;

type PixelEngine<C> = VisualizationEngine<PixelSurface, C>;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Live {
            input,
            seconds,
            snapshot,
            export,
            engine,
        } => run_live(
            input.as_deref(),
            seconds,
            snapshot.as_deref(),
            &export,
            &engine,
        ),
        Commands::Variants { config } => list_variants(config.as_deref()),
    }
}

fn run_live(
    input: Option<&Path>,
    seconds: Option<f32>,
    snapshot: Option<&Path>,
    export: &ExportOptions,
    options: &EngineOptions,
) -> Result<()> {
    let config = load_config(options.config.as_deref())?;
    let scheduler = PacedScheduler::new(config.engine.frame_rate);
    let mut engine = build_engine(&config, scheduler, options)?;
    tracing::info!(?input, variant = ?engine.active_name(), "starting live mode");

    let mut decoding = match input {
        Some(path) => Some(decode_file_async(path.to_path_buf())),
        None => {
            attach_capture(&mut engine)?;
            None
        }
    };
    let mut playback_end: Option<Instant> = None;
    let limit = seconds.map(|s| Instant::now() + Duration::from_secs_f32(s.max(0.0)));
    let mut last_report = Instant::now();

    engine.start();
    while let Some(handle) = engine.scheduler_mut().wait_due() {
        if let Some(pending) = decoding.as_mut() {
            if let Poll::Ready(result) = pending.poll() {
                decoding = None;
                let audio = result?;
                tracing::info!(
                    duration = ?audio.duration(),
                    sample_rate = audio.sample_rate,
                    "playback started"
                );
                playback_end = Some(Instant::now() + audio.duration());
                engine
                    .analyzer_mut()
                    .attach(Box::new(PlaybackSource::new(audio)));
            }
        }

        engine.on_frame(handle);

        if last_report.elapsed() >= Duration::from_secs(1) {
            let stats = engine.stats();
            tracing::info!(
                rendered = stats.rendered,
                skipped = stats.skipped,
                loudness = engine.analyzer().loudness(),
                "frame stats"
            );
            last_report = Instant::now();
        }

        let now = Instant::now();
        if limit.is_some_and(|at| now >= at) || playback_end.is_some_and(|at| now >= at) {
            break;
        }
    }
    engine.shutdown();

    if let Some(path) = snapshot {
        FrameExport::from_engine(&engine, path, export).save(engine.surface())?;
    }
    Ok(())
}

fn list_variants(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let analyzer = SignalAnalyzer::new(config.analyzer.clone())?;
    let mut engine = VisualizationEngine::with_default_variants(
        RecordingSurface::new(config.surface.width, config.surface.height),
        ManualScheduler::new(),
        analyzer,
    );

    let names: Vec<String> = engine.variant_names().map(str::to_owned).collect();
    for name in names {
        engine.select(&name);
        let kind = engine
            .active_visualization()
            .map(Visualize::name)
            .unwrap_or_default();
        println!("{name} ({kind})");
        for property in engine.current_properties() {
            println!(
                "  {:<20} {:>8} [{} .. {}, step {}]",
                property.key, property.value, property.min, property.max, property.step
            );
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

fn build_engine<C: FrameScheduler>(
    config: &AppConfig,
    scheduler: C,
    options: &EngineOptions,
) -> Result<PixelEngine<C>> {
    let analyzer = SignalAnalyzer::new(config.analyzer.clone())?;
    let surface = PixelSurface::new(config.surface.width, config.surface.height);
    let mut engine = VisualizationEngine::with_default_variants(surface, scheduler, analyzer);

    let variant = options
        .variant
        .as_deref()
        .unwrap_or(&config.engine.default_variant);
    engine.try_select(variant)?;

    for (key, value) in &options.properties {
        if !engine.set_property(key, *value) {
            tracing::warn!(key, value, "property not applied");
        }
    }
    Ok(engine)
}

#[cfg(feature = "capture")]
fn attach_capture<C: FrameScheduler>(engine: &mut PixelEngine<C>) -> Result<()> {
    let source = audio_visualiser_core::CaptureSource::open_default()?;
    engine.analyzer_mut().attach(Box::new(source));
    Ok(())
}

#[cfg(not(feature = "capture"))]
fn attach_capture<C: FrameScheduler>(_engine: &mut PixelEngine<C>) -> Result<()> {
    Err(VisualiserError::Capture(
        "built without the `capture` feature; pass an input file".into(),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Png,
    Jpeg,
}

/// Where and how the last frame is written.
#[derive(Debug, Clone, PartialEq)]
struct FrameExport {
    path: PathBuf,
    format: ExportFormat,
    quality: u8,
    variant: String,
    frame: u64,
}

impl FrameExport {
    fn from_engine<C: FrameScheduler>(
        engine: &PixelEngine<C>,
        path: &Path,
        export: &ExportOptions,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            format: export.format,
            quality: export.quality,
            variant: engine.active_name().unwrap_or_default().to_owned(),
            frame: engine.stats().rendered,
        }
    }

    fn save(&self, surface: &PixelSurface) -> Result<()> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        self.encode(surface.image(), &mut writer)?;
        writer.flush()?;
        tracing::info!(
            path = ?self.path,
            format = ?self.format,
            variant = %self.variant,
            frame = self.frame,
            "frame exported"
        );
        Ok(())
    }

    /// JPEG output drops the alpha channel.
    fn encode<W: Write>(&self, image: &RgbaImage, writer: W) -> Result<()> {
        let encoded = match self.format {
            ExportFormat::Png => PngEncoder::new(writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            ),
            ExportFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
                JpegEncoder::new_with_quality(writer, self.quality).write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )
            }
        };
        encoded.map_err(|e| VisualiserError::msg(e.to_string()))
    }
}

fn parse_property(raw: &str) -> std::result::Result<(String, f32), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let value = value
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("invalid value for `{key}`: {e}"))?;
    Ok((key.trim().to_owned(), value))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct EngineOptions {
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Visualization to select instead of the configured default.
    #[arg(short, long)]
    variant: Option<String>,
    /// Property override applied to the selected visualization.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_property)]
    properties: Vec<(String, f32)>,
}

#[derive(Args, Debug)]
struct ExportOptions {
    /// Image format of the snapshot.
    #[arg(long, value_enum, default_value_t = ExportFormat::Png)]
    format: ExportFormat,
    /// JPEG quality from 1 to 100.
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Visualise the microphone, or an audio file in real time.
    Live {
        /// Audio file to play; the default input device is used otherwise.
        input: Option<PathBuf>,
        /// Stop after this many seconds.
        #[arg(long)]
        seconds: Option<f32>,
        /// Write the last frame to this image on exit.
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[command(flatten)]
        export: ExportOptions,
        #[command(flatten)]
        engine: EngineOptions,
    },
    /// List the available visualizations and their properties.
    Variants {
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
