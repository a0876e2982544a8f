//! Export command - stitch a chunk span into one PNG.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use worldmap::coord::ChunkPos;
use worldmap::region::{merge_chunks, RegionImageStore};

use super::common::{parse_chunk, MapArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the export command.
#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub map: MapArgs,

    /// First chunk corner as X,Z
    #[arg(long, value_parser = parse_chunk, allow_hyphen_values = true)]
    pub from: ChunkPos,

    /// Opposite chunk corner as X,Z (inclusive)
    #[arg(long, value_parser = parse_chunk, allow_hyphen_values = true)]
    pub to: ChunkPos,

    /// Output PNG file
    #[arg(short, long, default_value = "export.png")]
    pub output: PathBuf,
}

/// Run the export command.
pub fn run(runner: &CliRunner, args: ExportArgs) -> Result<(), CliError> {
    runner.log_startup("export");
    let map_type = args.map.map_type()?;
    let world = args.map.world_id();
    let store = RegionImageStore::open(world, &args.map.map_dir, Duration::from_secs(15));

    let image = merge_chunks(&store, world, args.from, args.to, &map_type)?;
    image.save(&args.output).map_err(|source| CliError::WriteImage {
        path: args.output.clone(),
        source,
    })?;

    println!(
        "{} {} ({}x{} pixels)",
        style("Exported").green().bold(),
        args.output.display(),
        image.width(),
        image.height()
    );
    Ok(())
}
