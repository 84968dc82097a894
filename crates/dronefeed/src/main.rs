use std::path::Path;

use anyhow::{Context, Result, bail};

use dronefeed::display::headless::HeadlessHandle;
use dronefeed::frame::convert::rgb565_to_image;
use dronefeed::source::{TestPatternSource, parse_resolution};
use dronefeed::tracking::LogCommander;
use dronefeed::tracking::blob::ColorBlobDetector;
use dronefeed::{
    BackendFactory, DisplayConfig, DisplayStage, ExitReason, Pipeline, PipelineReport,
    ShutdownSignal, StageSettings, resolution_for_buffer_size,
};

const DEFAULT_FPS: u32 = 30;
/// The red bar of the test pattern plays the face.
const TRACK_COLOUR: [u8; 3] = [255, 0, 0];

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], name: &str) -> Result<Option<T>> {
    flag_value(args, name)
        .map(|v| {
            v.parse()
                .map_err(|_| anyhow::anyhow!("{name} expects a number, got '{v}'"))
        })
        .transpose()
}

#[cfg(feature = "window")]
fn window_factory() -> Option<BackendFactory> {
    Some(dronefeed::display::window::WindowBackend::factory())
}

#[cfg(not(feature = "window"))]
fn window_factory() -> Option<BackendFactory> {
    log::warn!("Built without the window feature, running headless");
    None
}

fn save_snapshot(report: &PipelineReport, path: &Path) -> Result<()> {
    let buffer = report
        .last_output
        .as_ref()
        .and_then(|io| io.buffer.as_ref())
        .context("No frame made it through the pipeline")?;
    let (width, height) = resolution_for_buffer_size(buffer.len());
    let image = rgb565_to_image(buffer, width, height)
        .context("Last frame has an unknown resolution")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
    log::info!("Saved snapshot to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut settings = StageSettings::load();
    if let Some(bpp) = parse_flag(&args, "--bpp")? {
        settings.bytes_per_pixel = bpp;
    }
    if args.iter().any(|a| a == "--save-settings") {
        settings.save();
    }

    let (width, height) = match flag_value(&args, "--resolution") {
        Some(name) => parse_resolution(name)
            .with_context(|| format!("Unknown resolution '{name}' (qcif, qvga, 360p, 720p)"))?,
        None => (320, 240),
    };
    let fps = parse_flag(&args, "--fps")?.unwrap_or(DEFAULT_FPS);
    let mut source = TestPatternSource::new(width, height).with_fps(fps);
    if let Some(frames) = parse_flag(&args, "--frames")? {
        source = source.with_limit(frames);
    }

    let headless = HeadlessHandle::new();
    let factory = if args.iter().any(|a| a == "--headless") {
        headless.factory()
    } else {
        window_factory().unwrap_or_else(|| headless.factory())
    };

    log::info!("Relaying {width}x{height} test pattern at {fps} fps");

    let shutdown = ShutdownSignal::new();
    let mut stage = DisplayStage::new(
        DisplayConfig::from_settings(&settings),
        factory,
        shutdown.clone(),
    );
    if args.iter().any(|a| a == "--track") {
        stage = stage
            .with_tracking(
                Box::new(ColorBlobDetector::new(TRACK_COLOUR)),
                Box::new(LogCommander::default()),
            )
            .context("Failed to start tracking worker")?;
        log::info!("Tracking the red bar");
    }
    let mut pipeline = Pipeline::new(shutdown);
    pipeline.add_stage(Box::new(stage));

    let report = pipeline.run(&mut source);
    if headless.title().is_some() {
        log::info!("Headless surface painted {} frames", headless.blit_count());
    }

    if let Some(path) = flag_value(&args, "--snapshot") {
        save_snapshot(&report, Path::new(path))?;
    }

    if let ExitReason::OpenFailed(index) = report.exit {
        bail!("Stage {index} failed to open");
    }
    Ok(())
}
