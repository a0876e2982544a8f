//! Worldmap CLI - Command-line interface
//!
//! Renders the tile grid headlessly, generates synthetic region rasters and
//! exports stitched map areas.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use console::style;

use commands::config::ConfigCommands;
use commands::export::ExportArgs;
use commands::render::RenderArgs;
use commands::synth::SynthArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "worldmap", version, about = "Tiled world map renderer")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render the tile grid around a block into a PNG
    Render(RenderArgs),

    /// Generate synthetic region rasters
    Synth(SynthArgs),

    /// Stitch a chunk span into a single PNG
    Export(ExportArgs),

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Config(command) => commands::config::run(command, config_path),
        Commands::Render(args) => {
            let runner = CliRunner::new(config_path, cli.verbose)?;
            commands::render::run(&runner, args)
        }
        Commands::Synth(args) => {
            let runner = CliRunner::new(config_path, cli.verbose)?;
            commands::synth::run(&runner, args)
        }
        Commands::Export(args) => {
            let runner = CliRunner::new(config_path, cli.verbose)?;
            commands::export::run(&runner, args)
        }
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
