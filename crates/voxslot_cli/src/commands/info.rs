use anyhow::Result;
use voxslot::SampleFormat;

use crate::cli_args::{CliArgs, InfoArgs};

pub fn info(_top_args: &CliArgs, info_args: &InfoArgs) -> Result<()> {
    let (engine, _clock) = super::offline_engine(&info_args.project, 44100, SampleFormat::Float32)?;

    println!("Name:     {}", engine.song_name(0)?);
    println!("Tempo:    {} BPM, speed {}", engine.song_bpm(0)?, engine.song_speed(0)?);
    let frames = engine.song_length_frames(0)?;
    println!(
        "Length:   {} lines, {:.1}s",
        engine.song_length_lines(0)?,
        frames as f64 / 44100.0
    );

    println!("Modules:");
    for m in 0..engine.number_of_modules(0)? {
        // Holes left by removed modules.
        let Ok(info) = engine.module_info(0, m) else {
            continue;
        };
        println!(
            "  {m:4} {:<12} {:<20} {:2} ctls -> {:?}",
            info.type_name, info.name, info.controllers, info.outputs
        );
    }

    println!("Patterns:");
    for p in 0..engine.number_of_patterns(0)? {
        let Ok((tracks, lines)) = engine.pattern_size(0, p) else {
            continue;
        };
        let (x, y) = engine.pattern_position(0, p)?;
        println!(
            "  {p:4} {:<20} {tracks}x{lines} at line {x}, lane {y}",
            engine.pattern_name(0, p)?
        );
    }
    Ok(())
}
