//! Start one slot exactly when another stops, and write what happens to a wave file.
//!
//! Slot 0 plays a short bass line ending in a stop effect.  Slot 1 is paused and armed with `sync_resume`, so it starts
//! its melody on the frame where slot 0 stopped.
//!
//! Usage: `cargo run --example slot_sync -- output_path`
use std::sync::Arc;

use anyhow::{Context, Result};
use voxslot::*;

const SR: u32 = 44100;

/// Make `slot` a one-generator song with `notes` one per line, followed by `tail` (if any) on the next line.
fn song(engine: &Engine, slot: usize, notes: &[u8], tail: Option<NoteEvent>) -> Result<()> {
    engine.open_slot(slot)?;
    let _lock = engine.lock(slot)?;

    let gen = engine.new_module(slot, "Generator", "lead", 0, 0, 0)?;
    engine.connect_module(slot, gen, OUTPUT_MODULE)?;

    let lines = notes.len() + 1;
    let p = engine.new_pattern(slot, None, 0, 0, 1, lines, "main")?;
    for (line, note) in notes.iter().enumerate() {
        engine.set_pattern_event(
            slot,
            p,
            0,
            line,
            EventPatch::from(NoteEvent::note_on(*note, 0, gen)),
        )?;
    }
    if let Some(tail) = tail {
        engine.set_pattern_event(slot, p, 0, notes.len(), EventPatch::from(tail))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args = std::env::args().collect::<Vec<_>>();
    let file_path = args.get(1).context("Specify a file path as the first argument")?;

    let config = EngineConfig::builder().sample_rate(SR).channels(2).build()?;
    let clock = Arc::new(ManualClock::new(Ticks(0)));
    let engine = Engine::with_parts(config, ModuleRegistry::with_builtins(), clock.clone())?;

    song(
        &engine,
        0,
        &[34, 34, 41, 39],
        Some(NoteEvent::effect(effect::STOP_PLAYING, 0)),
    )?;
    song(&engine, 1, &[58, 62, 65, 70, 65, 62, 58], None)?;

    engine.pause(1)?;
    engine.play_from_beginning(1)?;
    engine.sync_resume(1)?;
    engine.play_from_beginning(0)?;

    let spec = hound::WavSpec {
        channels: 2,
        sample_format: hound::SampleFormat::Float,
        bits_per_sample: 32,
        sample_rate: SR,
    };
    let mut writer = hound::WavWriter::create(file_path, spec)?;

    let mut block = vec![0.0f32; 1024 * 2];
    let mut frames = 0;
    while !engine.end_of_song(1)? {
        engine.render(OutputBuffer::F32(&mut block), 0, clock.now())?;
        clock.advance_frames(1024, SR);
        frames += 1024;
        for s in block.iter() {
            writer.write_sample(*s)?;
        }
    }

    writer.finalize()?;
    println!("Wrote {:.2}s to {file_path}", frames as f64 / SR as f64);
    Ok(())
}
