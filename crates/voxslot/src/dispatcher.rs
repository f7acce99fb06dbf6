//! Mixes every running slot into the caller's buffer, one internal block at a time, and carries sync pulses from the
//! slots raising them to the slots waiting on them.
use std::sync::atomic::Ordering;

use crate::config::{MAX_BLOCK_FRAMES, MAX_SLOTS, MAX_VOLUME};
use crate::engine::control::SlotControl;
use crate::error::{ErrorPayload, Result};
use crate::slot::SlotEngine;
use crate::time::{ticks_for_frames, Ticks};

/// Interleaved output samples.
#[derive(Debug)]
pub enum OutputBuffer<'a> {
    I16(&'a mut [i16]),
    F32(&'a mut [f32]),
}

impl OutputBuffer<'_> {
    pub fn len(&self) -> usize {
        match self {
            OutputBuffer::I16(b) => b.len(),
            OutputBuffer::F32(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn format(&self) -> crate::SampleFormat {
        match self {
            OutputBuffer::I16(_) => crate::SampleFormat::Int16,
            OutputBuffer::F32(_) => crate::SampleFormat::Float32,
        }
    }
}

/// Interleaved input samples for filter mode.
#[derive(Copy, Clone, Debug)]
pub enum InputBuffer<'a> {
    I16(&'a [i16]),
    F32(&'a [f32]),
}

impl InputBuffer<'_> {
    pub fn len(&self) -> usize {
        match self {
            InputBuffer::I16(b) => b.len(),
            InputBuffer::F32(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sample(&self, index: usize) -> f32 {
        match self {
            InputBuffer::I16(b) => b[index] as f32 / 32768.0,
            InputBuffer::F32(b) => b[index],
        }
    }
}

/// Timing of one dispatcher call.
#[derive(Copy, Clone, Debug)]
pub(crate) struct RenderTiming {
    pub(crate) sample_rate: u32,
    pub(crate) ticks_per_second: u32,
    /// When the first frame will be heard.
    pub(crate) out_time: Ticks,
    /// Device latency in frames.
    pub(crate) latency: u32,
}

pub(crate) struct Dispatcher {
    mix: [Vec<f32>; 2],
    input: [Vec<f32>; 2],
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Dispatcher {
            mix: [vec![0.0; MAX_BLOCK_FRAMES], vec![0.0; MAX_BLOCK_FRAMES]],
            input: [vec![0.0; MAX_BLOCK_FRAMES], vec![0.0; MAX_BLOCK_FRAMES]],
        }
    }

    /// Fill `output` from every open slot.  Returns whether any nonzero sample was written.
    pub(crate) fn render(
        &mut self,
        slots: &mut [Option<Box<SlotEngine>>; MAX_SLOTS],
        controls: &[SlotControl; MAX_SLOTS],
        timing: RenderTiming,
        channels: usize,
        mut output: OutputBuffer<'_>,
        input: Option<(InputBuffer<'_>, usize)>,
    ) -> Result<bool> {
        if output.len() % channels != 0 {
            return Err(ErrorPayload::InvalidBuffer("output length is not a multiple of the channel count").into());
        }
        let frames = output.len() / channels;
        if let Some((buf, in_channels)) = input {
            if !(1..=2).contains(&in_channels) {
                return Err(ErrorPayload::InvalidBuffer("input must have 1 or 2 channels").into());
            }
            if buf.len() < frames * in_channels {
                return Err(ErrorPayload::InvalidBuffer("input is shorter than output").into());
            }
        }

        let latency_ticks = ticks_for_frames(
            timing.latency as usize,
            timing.sample_rate,
            timing.ticks_per_second,
        );
        let mut signal = false;
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(MAX_BLOCK_FRAMES);
            let offset = ticks_for_frames(done, timing.sample_rate, timing.ticks_per_second);
            let heard_at = timing.out_time.wrapping_add(offset);
            // Blocks are computed `latency` ahead of being heard; live events are placed against the compute time.
            let block_tick = Ticks(heard_at.0.wrapping_sub(latency_ticks));

            let with_input = match input {
                Some((buf, in_channels)) => {
                    self.deinterleave(buf, in_channels, done, n);
                    true
                }
                None => false,
            };
            self.render_block(slots, controls, n, block_tick, heard_at, with_input);
            signal |= self.write(&mut output, channels, done, n);
            done += n;
        }

        Ok(signal)
    }

    fn deinterleave(&mut self, buf: InputBuffer<'_>, in_channels: usize, start_frame: usize, frames: usize) {
        let [l, r] = &mut self.input;
        for i in 0..frames {
            let base = (start_frame + i) * in_channels;
            let left = buf.sample(base);
            l[i] = left;
            r[i] = if in_channels == 2 { buf.sample(base + 1) } else { left };
        }
    }

    fn render_block(
        &mut self,
        slots: &mut [Option<Box<SlotEngine>>; MAX_SLOTS],
        controls: &[SlotControl; MAX_SLOTS],
        frames: usize,
        block_tick: Ticks,
        heard_at: Ticks,
        with_input: bool,
    ) {
        for ch in self.mix.iter_mut() {
            ch[..frames].fill(0.0);
        }
        let Dispatcher { mix, input } = self;
        let external = with_input.then(|| [&input[0][..frames], &input[1][..frames]]);

        let mut pulse: Option<usize> = None;
        for (slot, control) in slots.iter_mut().zip(controls.iter()) {
            let Some(slot) = slot else {
                continue;
            };
            while let Some(event) = control.events.pop() {
                slot.queue(event);
            }
            if control.suspended.load(Ordering::Acquire) {
                continue;
            }
            let report = slot.render(0, frames, block_tick, heard_at, external);
            mix_into(mix, slot, frames);
            if let Some(at) = report.sync_pulse {
                pulse = Some(pulse.map_or(at, |p| p.min(at)));
            }
        }

        let Some(pulse) = pulse else {
            return;
        };
        rt_debug!("sync pulse at frame {}", pulse);
        for (slot, control) in slots.iter_mut().zip(controls.iter()) {
            if !control.sync_armed.swap(false, Ordering::AcqRel) {
                continue;
            }
            let Some(slot) = slot else {
                continue;
            };
            if !control.suspended.swap(false, Ordering::AcqRel) {
                continue;
            }
            slot.render(pulse, frames, block_tick, heard_at, external);
            mix_into(mix, slot, frames);
        }
    }

    /// Convert the mix into `output` at `start_frame`.  Returns whether anything nonzero was written.
    fn write(&self, output: &mut OutputBuffer<'_>, channels: usize, start_frame: usize, frames: usize) -> bool {
        let [l, r] = &self.mix;
        let mut signal = false;
        let mut put = |i: usize, c: usize, value: f32| match output {
            OutputBuffer::F32(b) => {
                b[(start_frame + i) * channels + c] = value;
                signal |= value != 0.0;
            }
            OutputBuffer::I16(b) => {
                let s = (value.clamp(-1.0, 1.0) * 32767.0) as i16;
                b[(start_frame + i) * channels + c] = s;
                signal |= s != 0;
            }
        };
        for i in 0..frames {
            if channels == 1 {
                put(i, 0, (l[i] + r[i]) * 0.5);
            } else {
                put(i, 0, l[i]);
                put(i, 1, r[i]);
            }
        }
        signal
    }
}

fn mix_into(mix: &mut [Vec<f32>; 2], slot: &SlotEngine, frames: usize) {
    let gain = slot.volume as f32 / MAX_VOLUME as f32;
    for (ch, dest) in mix.iter_mut().enumerate() {
        for (d, s) in dest[..frames].iter_mut().zip(slot.graph.output(ch).iter()) {
            *d += *s * gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::TICKS_PER_SECOND;
    use crate::graph::ModuleNode;
    use crate::modules::{Generator, Input};
    use crate::note::NoteEvent;
    use crate::router::TimedEvent;

    const SR: u32 = 50_000;

    fn timing(out_time: u32) -> RenderTiming {
        RenderTiming {
            sample_rate: SR,
            ticks_per_second: TICKS_PER_SECOND,
            out_time: Ticks(out_time),
            latency: 0,
        }
    }

    fn empty() -> ([Option<Box<SlotEngine>>; MAX_SLOTS], [SlotControl; MAX_SLOTS]) {
        (
            std::array::from_fn(|_| None),
            std::array::from_fn(|_| SlotControl::new()),
        )
    }

    #[test]
    fn silence_without_slots() {
        let (mut slots, controls) = empty();
        let mut d = Dispatcher::new();
        let mut out = vec![1.0f32; 4096];
        let signal = d
            .render(&mut slots, &controls, timing(0), 2, OutputBuffer::F32(&mut out), None)
            .unwrap();
        assert!(!signal);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn rejects_ragged_buffers() {
        let (mut slots, controls) = empty();
        let mut d = Dispatcher::new();
        let mut out = vec![0i16; 3];
        let err = d
            .render(&mut slots, &controls, timing(0), 2, OutputBuffer::I16(&mut out), None)
            .unwrap_err();
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn events_cross_sub_blocks() {
        let (mut slots, controls) = empty();
        let mut slot = SlotEngine::new(SR, TICKS_PER_SECOND);
        let gen = slot
            .graph
            .insert(ModuleNode::new("gen", Box::new(Generator::new())))
            .unwrap();
        slot.graph.connect(gen, 0).unwrap();
        slots[0] = Some(Box::new(slot));

        // Frame 1500 of a 3000 frame request is in the second internal block.
        controls[0]
            .events
            .push(TimedEvent {
                tick: Ticks(1500 * 20),
                voice: 64,
                event: NoteEvent::note_on(58, 0, gen),
                raw_ctl_val: None,
            })
            .unwrap();

        let mut d = Dispatcher::new();
        let mut out = vec![0.0f32; 3000];
        assert!(d
            .render(&mut slots, &controls, timing(0), 1, OutputBuffer::F32(&mut out), None)
            .unwrap());
        assert_eq!(out.iter().position(|s| *s != 0.0), Some(1500));
    }

    #[test]
    fn filter_input_reaches_the_graph() {
        let (mut slots, controls) = empty();
        let mut slot = SlotEngine::new(SR, TICKS_PER_SECOND);
        let input = slot
            .graph
            .insert(ModuleNode::new("in", Box::new(Input::new())))
            .unwrap();
        slot.graph.connect(input, 0).unwrap();
        slots[3] = Some(Box::new(slot));

        let samples = vec![0.5f32; 256];
        let mut out = vec![0.0f32; 512];
        let mut d = Dispatcher::new();
        d.render(
            &mut slots,
            &controls,
            timing(0),
            2,
            OutputBuffer::F32(&mut out),
            Some((InputBuffer::F32(&samples), 1)),
        )
        .unwrap();
        assert!(out.iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn int16_output_clamps() {
        let (mut slots, controls) = empty();
        let mut slot = SlotEngine::new(SR, TICKS_PER_SECOND);
        let input = slot
            .graph
            .insert(ModuleNode::new("in", Box::new(Input::new())))
            .unwrap();
        slot.graph.connect(input, 0).unwrap();
        slots[0] = Some(Box::new(slot));

        let samples = vec![i16::MIN; 64];
        let mut out = vec![0i16; 64];
        let mut d = Dispatcher::new();
        d.render(
            &mut slots,
            &controls,
            timing(0),
            1,
            OutputBuffer::I16(&mut out),
            Some((InputBuffer::I16(&samples), 1)),
        )
        .unwrap();
        assert!(out.iter().all(|s| *s == -32767));
    }
}
