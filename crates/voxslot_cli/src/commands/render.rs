use anyhow::Result;
use voxslot::{OutputBuffer, SampleFormat, TimeSource};

use crate::cli_args::{CliArgs, RenderArgs};

const BLOCK_FRAMES: usize = 4096;

pub fn render(_top_args: &CliArgs, render_args: &RenderArgs) -> Result<()> {
    let format = if render_args.int16 {
        SampleFormat::Int16
    } else {
        SampleFormat::Float32
    };
    let sr = render_args.sample_rate;
    let (engine, clock) = super::offline_engine(&render_args.project, sr, format)?;
    engine.set_autostop(0, !render_args.looping)?;

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: sr,
        bits_per_sample: if render_args.int16 { 16 } else { 32 },
        sample_format: if render_args.int16 {
            hound::SampleFormat::Int
        } else {
            hound::SampleFormat::Float
        },
    };
    let mut writer = hound::WavWriter::create(&render_args.output, spec)?;

    let limit = (render_args.seconds.max(0.0) * sr as f64) as usize;
    let mut float_block = vec![0.0f32; BLOCK_FRAMES * 2];
    let mut int_block = vec![0i16; BLOCK_FRAMES * 2];
    let mut written = 0;

    engine.play_from_beginning(0)?;
    while written < limit && !engine.end_of_song(0)? {
        let frames = (limit - written).min(BLOCK_FRAMES);
        let now = clock.now();
        if render_args.int16 {
            let block = &mut int_block[..frames * 2];
            engine.render(OutputBuffer::I16(block), 0, now)?;
            for s in block.iter() {
                writer.write_sample(*s)?;
            }
        } else {
            let block = &mut float_block[..frames * 2];
            engine.render(OutputBuffer::F32(block), 0, now)?;
            for s in block.iter() {
                writer.write_sample(*s)?;
            }
        }
        clock.advance_frames(frames, sr);
        written += frames;
    }

    writer.finalize()?;
    log::info!(
        "Wrote {written} frames ({:.1}s) to {}",
        written as f64 / sr as f64,
        render_args.output.display()
    );
    Ok(())
}
