use std::any::Any;
use std::io::Read;

use super::*;
use crate::config::MAX_VOICES;

/// Note at which a sample plays at its recorded speed (C5).
const BASE_NOTE: u8 = 61;

/// Most samples one sampler holds.
pub const MAX_SAMPLES: usize = 128;

/// Decoded PCM held by a [Sampler], at most stereo.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleData {
    pub sample_rate: u32,
    /// One buffer per channel, all the same length.
    pub channels: Vec<Vec<f32>>,
}

impl SampleData {
    /// Decode a WAV stream.  Channels beyond the second are dropped.
    pub fn from_wav(reader: impl Read) -> crate::Result<SampleData> {
        let mut reader = hound::WavReader::new(reader)?;
        let spec = reader.spec();
        let source_channels = spec.channels.max(1) as usize;
        let kept = source_channels.min(2);

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let mut channels = vec![Vec::with_capacity(interleaved.len() / source_channels); kept];
        for frame in interleaved.chunks_exact(source_channels) {
            for (dest, s) in channels.iter_mut().zip(frame) {
                dest.push(*s);
            }
        }

        Ok(SampleData {
            sample_rate: spec.sample_rate,
            channels,
        })
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    fn frame(&self, index: usize) -> (f32, f32) {
        match &self.channels[..] {
            [mono] => (mono[index], mono[index]),
            [l, r, ..] => (l[index], r[index]),
            [] => (0.0, 0.0),
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct SamplerVoice {
    active: bool,
    sample: usize,
    position: f64,
    step: f64,
    gain: f32,
}

/// Plays loaded samples, pitched relative to C5.
///
/// Sample 0 plays unless a sample was loaded into the slot matching the note's octave.
pub struct Sampler {
    samples: Vec<Option<SampleData>>,
    voices: Vec<SamplerVoice>,
}

impl Sampler {
    pub const TYPE_NAME: &'static str = "Sampler";

    const VOLUME: usize = 0;
    const PANNING: usize = 1;

    pub fn new() -> Self {
        Sampler {
            samples: vec![],
            voices: vec![SamplerVoice::default(); MAX_VOICES],
        }
    }

    /// Store `data` in `slot`, or replace every sample with it when `slot` is `None`.
    pub fn load_sample(&mut self, data: SampleData, slot: Option<usize>) -> crate::Result<()> {
        for v in self.voices.iter_mut() {
            v.active = false;
        }

        match slot {
            None => {
                self.samples = vec![Some(data)];
            }
            Some(slot) if slot < MAX_SAMPLES => {
                if self.samples.len() <= slot {
                    self.samples.resize(slot + 1, None);
                }
                self.samples[slot] = Some(data);
            }
            Some(slot) => {
                return Err(crate::error::ErrorPayload::SampleSlotOutOfRange(slot).into());
            }
        }

        Ok(())
    }

    pub fn sample(&self, slot: usize) -> Option<&SampleData> {
        self.samples.get(slot).and_then(Option::as_ref)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.iter().flatten().count()
    }

    fn sample_for_note(&self, note: u8) -> Option<usize> {
        let octave = (note.saturating_sub(1) / 12) as usize;
        if self.sample(octave).is_some() {
            return Some(octave);
        }
        self.samples.iter().position(Option::is_some)
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleHandler for Sampler {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Generator
    }

    fn controllers(&self) -> Vec<ControllerSpec> {
        vec![
            ControllerSpec::new("Volume", 0, 512, 256),
            ControllerSpec::new("Panning", 0, 256, 128).with_offset(-128),
        ]
    }

    fn handle_event(&mut self, event: &ModuleEvent, _controllers: &[Controller]) {
        match *event {
            ModuleEvent::NoteOn {
                voice,
                note,
                velocity,
                frequency,
            } => {
                let Some(sample) = self.sample_for_note(note) else {
                    return;
                };
                let Some(data) = self.sample(sample) else {
                    return;
                };
                let ratio = frequency as f64 / crate::note::note_frequency(BASE_NOTE, 0, 0) as f64;
                let step = ratio * data.sample_rate as f64;
                if let Some(v) = self.voices.get_mut(voice) {
                    *v = SamplerVoice {
                        active: true,
                        sample,
                        position: 0.0,
                        // Stored as source frames per second; divided by the output rate when rendering.
                        step,
                        gain: velocity as f32 / crate::note::DEFAULT_VELOCITY as f32,
                    };
                }
            }
            ModuleEvent::NoteOff { voice } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.active = false;
                }
            }
            ModuleEvent::AllNotesOff | ModuleEvent::Reset => {
                for v in self.voices.iter_mut() {
                    v.active = false;
                }
            }
            ModuleEvent::Effect { .. } => {}
        }
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let volume = ctx.controllers[Self::VOLUME].raw() as f32 / 256.0;
        let (pan_l, pan_r) = pan_gains(ctx.controllers[Self::PANNING].raw());
        let sr = ctx.sample_rate as f64;
        let [left, right] = &mut ctx.outputs;

        for voice in self.voices.iter_mut().filter(|v| v.active) {
            let Some(Some(data)) = self.samples.get(voice.sample) else {
                voice.active = false;
                continue;
            };
            let frames = data.frames();
            let step = voice.step / sr;

            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let index = voice.position as usize;
                if index >= frames {
                    voice.active = false;
                    break;
                }
                let (frame_l, frame_r) = data.frame(index);
                *l += frame_l * voice.gain * volume * pan_l;
                *r += frame_r * voice.gain * volume * pan_r;
                voice.position += step;
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
