//! CLI subcommands.

pub mod common;
pub mod config;
pub mod export;
pub mod render;
pub mod stats;
pub mod synth;
