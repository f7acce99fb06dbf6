//! Definition of the Clap command line.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render a project to a wave file.
    Render(RenderArgs),

    /// Print a summary of a project.
    Info(InfoArgs),
}

#[derive(Debug, Parser)]
pub struct RenderArgs {
    pub project: PathBuf,

    /// Wave file to write.
    #[arg(short, long, default_value = "out.wav")]
    pub output: PathBuf,

    /// Stop after this many seconds even if the song is still playing.
    #[arg(short, long, default_value_t = 60.0)]
    pub seconds: f64,

    #[arg(long, default_value_t = 44100)]
    pub sample_rate: u32,

    /// Write 16-bit integer samples instead of 32-bit float.
    #[arg(long)]
    pub int16: bool,

    /// Loop the song instead of stopping at its end.  Rendering then always runs for `--seconds`.
    #[arg(long = "loop")]
    pub looping: bool,
}

#[derive(Debug, Parser)]
pub struct InfoArgs {
    pub project: PathBuf,
}
