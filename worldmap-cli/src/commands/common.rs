//! Argument types shared across commands.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Args;
use worldmap::coord::{ChunkPos, MapKind, MapType, WorldId};

use crate::error::CliError;

/// Which map of which world to read.
#[derive(Debug, Clone, Args)]
pub struct MapArgs {
    /// World map directory holding the DIM{n} folders
    #[arg(long, value_name = "DIR")]
    pub map_dir: PathBuf,

    /// Numeric world id
    #[arg(long, default_value_t = 0)]
    pub world: u32,

    /// Map type: day, night, topo or underground
    #[arg(long, default_value = "day")]
    pub map_type: String,

    /// Vertical slice for underground maps
    #[arg(long)]
    pub slice: Option<u8>,

    /// Dimension id
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub dimension: i32,
}

impl MapArgs {
    pub fn world_id(&self) -> WorldId {
        WorldId(self.world)
    }

    pub fn map_type(&self) -> Result<MapType, CliError> {
        let kind = MapKind::from_str(&self.map_type)?;
        Ok(MapType::new(kind, self.slice, self.dimension))
    }
}

/// Parse `"x,z"` into a chunk position.
pub fn parse_chunk(value: &str) -> Result<ChunkPos, String> {
    let (x, z) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Z but got '{}'", value))?;
    let x = x.trim().parse::<i32>().map_err(|e| e.to_string())?;
    let z = z.trim().parse::<i32>().map_err(|e| e.to_string())?;
    Ok(ChunkPos::new(x, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk() {
        assert_eq!(parse_chunk("3,-4").unwrap(), ChunkPos::new(3, -4));
        assert_eq!(parse_chunk(" -1 , 2 ").unwrap(), ChunkPos::new(-1, 2));
        assert!(parse_chunk("3").is_err());
        assert!(parse_chunk("a,b").is_err());
    }

    #[test]
    fn test_map_type_from_args() {
        let args = MapArgs {
            map_dir: PathBuf::from("/tmp"),
            world: 0,
            map_type: "cave".to_string(),
            slice: Some(3),
            dimension: -1,
        };
        assert_eq!(args.map_type().unwrap(), MapType::underground(3, -1));

        let bad = MapArgs {
            map_type: "sepia".to_string(),
            ..args
        };
        assert!(bad.map_type().is_err());
    }
}
