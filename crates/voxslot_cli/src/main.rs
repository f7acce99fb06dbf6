//! Offline renderer for voxslot projects.
//!
//! Projects are loaded into slot 0 of an engine that runs on a manual clock, so rendering is as fast as the machine
//! allows and the output is the same on every run.
mod cli_args;
mod commands;

fn main() -> anyhow::Result<()> {
    use clap::Parser;

    env_logger::init();
    let args = cli_args::CliArgs::parse();
    commands::dispatch_command(args)
}
