mod info;
mod render;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use voxslot::{Engine, EngineConfig, ManualClock, ModuleRegistry, SampleFormat, Ticks};

use crate::cli_args;

/// Figure out what command to run, then run it.
pub fn dispatch_command(args: cli_args::CliArgs) -> Result<()> {
    match &args.command {
        cli_args::Command::Render(r) => render::render(&args, r),
        cli_args::Command::Info(i) => info::info(&args, i),
    }
}

/// An engine driven from this thread, with `project` loaded into slot 0.
fn offline_engine(
    project: &Path,
    sample_rate: u32,
    sample_format: SampleFormat,
) -> Result<(Engine, Arc<ManualClock>)> {
    let config = EngineConfig::builder()
        .sample_rate(sample_rate)
        .channels(2)
        .sample_format(sample_format)
        .one_thread(true)
        .build()?;
    let clock = Arc::new(ManualClock::new(Ticks(0)));
    let engine = Engine::with_parts(config, ModuleRegistry::with_builtins(), clock.clone())?;
    engine.open_slot(0)?;
    engine
        .load_project(0, project)
        .with_context(|| format!("loading {}", project.display()))?;
    Ok((engine, clock))
}
