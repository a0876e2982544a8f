//! Synth command - generate synthetic region rasters for testing and demos.

use std::time::Duration;

use clap::Args;
use console::style;
use image::{Rgba, RgbaImage};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use worldmap::coord::{MapKind, RegionCoord, CHUNK_SIZE, REGION_CHUNKS, TILE_SIZE};
use worldmap::region::RegionImageStore;

use super::common::MapArgs;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the synth command.
#[derive(Debug, Args)]
pub struct SynthArgs {
    #[command(flatten)]
    pub map: MapArgs,

    /// Regions generated in each direction from the origin
    #[arg(long, default_value_t = 1)]
    pub radius: i32,

    /// Random seed; the same seed always yields the same map
    #[arg(long)]
    pub seed: Option<u64>,
}

const PALETTE: [[u8; 3]; 6] = [
    [0x3b, 0x7d, 0x3a], // grass
    [0x2f, 0x5d, 0x2b], // forest
    [0xc9, 0xb2, 0x7c], // sand
    [0x7f, 0x7f, 0x7f], // stone
    [0x2b, 0x4f, 0x9e], // water
    [0xe8, 0xe8, 0xf0], // snow
];

/// Run the synth command.
pub fn run(runner: &CliRunner, args: SynthArgs) -> Result<(), CliError> {
    runner.log_startup("synth");
    if args.radius < 0 {
        return Err(CliError::Usage("--radius must not be negative".to_string()));
    }
    let map_type = args.map.map_type()?;
    let world = args.map.world_id();
    let store = RegionImageStore::open(world, &args.map.map_dir, Duration::from_secs(60));
    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = StdRng::seed_from_u64(seed);

    let side = (args.radius * 2 + 1) as u64;
    let progress = ProgressBar::new(side * side);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} regions {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let night = map_type.kind() == MapKind::Night;
    for rz in -args.radius..=args.radius {
        for rx in -args.radius..=args.radius {
            let region = RegionCoord::new(rx, rz, map_type.dimension(), world);
            let image = synth_region(&mut rng, night);
            store.put_region(&region, &map_type, &image)?;
            progress.set_message(region.to_string());
            progress.inc(1);
        }
    }
    progress.finish_and_clear();

    let written = store.flush()?;
    println!(
        "{} {} region rasters under {} (seed {})",
        style("Generated").green().bold(),
        written,
        args.map.map_dir.display(),
        seed
    );
    Ok(())
}

/// One region of chunk-sized patches with per-block jitter.
fn synth_region(rng: &mut StdRng, night: bool) -> RgbaImage {
    let mut image = RgbaImage::new(TILE_SIZE, TILE_SIZE);
    let chunk = CHUNK_SIZE as u32;
    for cz in 0..REGION_CHUNKS as u32 {
        for cx in 0..REGION_CHUNKS as u32 {
            let base = PALETTE[rng.random_range(0..PALETTE.len())];
            for bz in 0..chunk {
                for bx in 0..chunk {
                    let jitter: i16 = rng.random_range(-12..=12);
                    let mut px = [0u8; 4];
                    for (c, value) in base.iter().enumerate() {
                        let v = (*value as i16 + jitter).clamp(0, 255) as u8;
                        px[c] = if night { v / 3 } else { v };
                    }
                    px[3] = 255;
                    image.put_pixel(cx * chunk + bx, cz * chunk + bz, Rgba(px));
                }
            }
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synth_region_is_opaque_and_seeded() {
        let a = synth_region(&mut StdRng::seed_from_u64(7), false);
        let b = synth_region(&mut StdRng::seed_from_u64(7), false);
        assert_eq!(a.dimensions(), (TILE_SIZE, TILE_SIZE));
        assert!(a.pixels().all(|p| p.0[3] == 255));
        assert_eq!(a, b);
    }

    #[test]
    fn test_night_is_darker() {
        let day = synth_region(&mut StdRng::seed_from_u64(1), false);
        let night = synth_region(&mut StdRng::seed_from_u64(1), true);
        let sum = |img: &RgbaImage| img.pixels().map(|p| p.0[0] as u64).sum::<u64>();
        assert!(sum(&night) < sum(&day));
    }
}
