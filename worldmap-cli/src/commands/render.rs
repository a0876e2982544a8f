//! Render command - draw the viewport grid headlessly into a PNG.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use worldmap::region::RegionImageStore;
use worldmap::render::MapContext;
use worldmap::session::MapSession;
use worldmap::texture::HeadlessBackend;

use super::common::MapArgs;
use super::stats::print_session_stats;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the render command.
#[derive(Debug, Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub map: MapArgs,

    /// Center block X
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub x: i32,

    /// Center block Z
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub z: i32,

    /// Zoom level (0-5)
    #[arg(long, default_value_t = 0)]
    pub zoom: u8,

    /// Output width in pixels
    #[arg(long, default_value_t = 1024)]
    pub width: u32,

    /// Output height in pixels
    #[arg(long, default_value_t = 768)]
    pub height: u32,

    /// Seconds to wait for every visible tile to load
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Disable upscaled textures for zoomed-in tiles
    #[arg(long)]
    pub low_quality: bool,

    /// Print cache and render statistics as JSON
    #[arg(long)]
    pub json: bool,

    /// Output PNG file
    #[arg(short, long, default_value = "map.png")]
    pub output: PathBuf,
}

/// Run the render command.
pub fn run(runner: &CliRunner, args: RenderArgs) -> Result<(), CliError> {
    runner.log_startup("render");
    let map_type = args.map.map_type()?;
    let world = args.map.world_id();

    let mut config = runner.config().clone();
    if args.low_quality {
        config = config.with_high_quality(false);
    }

    let store = Arc::new(RegionImageStore::open(
        world,
        &args.map.map_dir,
        config.cache.region_image_idle,
    ));
    let mut session = MapSession::new(store.clone(), config)?;
    session.caches().register(Arc::new(store.cache().clone()));
    session.recenter(args.x, args.z, args.zoom, MapContext::new(world, map_type))?;

    let mut backend = HeadlessBackend::new(args.width, args.height);
    let (width, height) = (args.width as i32, args.height as i32);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));

    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    let report = loop {
        backend.begin_frame();
        let report = session.frame(&mut backend, map_type, width, height, 1.0);
        spinner.set_message(format!(
            "frame {} - {} steps drawn, {} loading",
            session.frames(),
            report.drawn,
            report.placeholders
        ));
        if report.placeholders == 0 && !session.grid().has_unloaded_tile() {
            break report;
        }
        if Instant::now() >= deadline {
            warn!(
                placeholders = report.placeholders,
                "Timed out waiting for tiles, writing partial image"
            );
            break report;
        }
        std::thread::sleep(Duration::from_millis(2));
    };
    spinner.finish_and_clear();

    backend
        .canvas()
        .save(&args.output)
        .map_err(|source| CliError::WriteImage {
            path: args.output.clone(),
            source,
        })?;

    println!(
        "{} {} ({}x{}, {} frames, {} tiles visible)",
        style("Wrote").green().bold(),
        args.output.display(),
        args.width,
        args.height,
        session.frames(),
        report.visible
    );
    if report.placeholders > 0 {
        println!(
            "{} {} draw steps were still loading",
            style("warning:").yellow().bold(),
            report.placeholders
        );
    }
    println!();
    print_session_stats(&session, args.json);
    Ok(())
}
