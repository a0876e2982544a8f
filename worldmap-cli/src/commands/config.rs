//! Configuration CLI commands.
//!
//! Provides `config path`, `config show` and `config init` for inspecting
//! and creating the INI configuration file.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use console::style;
use worldmap::config::MapConfig;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand. Runs without logging so output stays clean.
pub fn run(command: ConfigCommands, path: Option<&Path>) -> Result<(), CliError> {
    let path = resolve_path(path)?;
    match command {
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let config = MapConfig::load_or_default(&path)?;
            print!("{}", config.to_ini_string());
            Ok(())
        }
        ConfigCommands::Init { force } => run_init(&path, force),
    }
}

fn resolve_path(path: Option<&Path>) -> Result<PathBuf, CliError> {
    path.map(Path::to_path_buf)
        .or_else(MapConfig::default_path)
        .ok_or_else(|| {
            CliError::Usage(
                "No configuration directory on this platform. Use --config to pick a file."
                    .to_string(),
            )
        })
}

fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Usage(format!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        )));
    }
    MapConfig::default().save(path)?;
    println!("{} {}", style("Created").green().bold(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");

        run_init(&path, false).unwrap();
        assert!(path.exists());
        assert!(matches!(run_init(&path, false), Err(CliError::Usage(_))));
        run_init(&path, true).unwrap();
        assert_eq!(MapConfig::load(&path).unwrap(), MapConfig::default());
    }
}
