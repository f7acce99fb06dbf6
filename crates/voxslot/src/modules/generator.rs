use std::any::Any;
use std::f32::consts::TAU;

use super::*;
use crate::config::MAX_VOICES;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Waveform {
    Triangle,
    Saw,
    Square,
    Sine,
}

impl Waveform {
    fn from_controller(value: i32) -> Waveform {
        match value {
            1 => Waveform::Saw,
            2 => Waveform::Square,
            3 => Waveform::Sine,
            _ => Waveform::Triangle,
        }
    }

    /// Value at `phase` in `0.0..1.0`.
    fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
            Waveform::Saw => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sine => (phase * TAU).sin(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
enum Stage {
    #[default]
    Idle,
    Attack,
    Sustain,
    Release,
}

#[derive(Copy, Clone, Debug, Default)]
struct Voice {
    stage: Stage,
    phase: f32,
    frequency: f32,
    gain: f32,
    envelope: f32,
}

/// A polyphonic oscillator with a linear attack/release envelope, one voice per track.
pub struct Generator {
    voices: Vec<Voice>,
}

impl Generator {
    pub const TYPE_NAME: &'static str = "Generator";

    const VOLUME: usize = 0;
    const WAVEFORM: usize = 1;
    const PANNING: usize = 2;
    const ATTACK: usize = 3;
    const RELEASE: usize = 4;

    pub fn new() -> Self {
        Generator {
            voices: vec![Voice::default(); MAX_VOICES],
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| !matches!(v.stage, Stage::Idle))
            .count()
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

/// Envelope change per frame for a ramp lasting `ms` milliseconds, or `None` for an instant change.
fn envelope_step(ms: i32, sample_rate: u32) -> Option<f32> {
    if ms <= 0 {
        return None;
    }
    Some(1000.0 / (ms as f32 * sample_rate as f32))
}

impl ModuleHandler for Generator {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Generator
    }

    fn controllers(&self) -> Vec<ControllerSpec> {
        vec![
            ControllerSpec::new("Volume", 0, 256, 128),
            ControllerSpec::new("Waveform", 0, 3, 0).selector(),
            ControllerSpec::new("Panning", 0, 256, 128).with_offset(-128),
            ControllerSpec::new("Attack", 0, 512, 0).in_group(1),
            ControllerSpec::new("Release", 0, 512, 0).in_group(1),
        ]
    }

    fn handle_event(&mut self, event: &ModuleEvent, controllers: &[Controller]) {
        match *event {
            ModuleEvent::NoteOn {
                voice,
                velocity,
                frequency,
                ..
            } => {
                let Some(v) = self.voices.get_mut(voice) else {
                    return;
                };
                let attack = controllers[Self::ATTACK].raw() > 0;
                *v = Voice {
                    stage: if attack { Stage::Attack } else { Stage::Sustain },
                    phase: 0.0,
                    frequency,
                    gain: velocity as f32 / crate::note::DEFAULT_VELOCITY as f32,
                    envelope: if attack { 0.0 } else { 1.0 },
                };
            }
            ModuleEvent::NoteOff { voice } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    if !matches!(v.stage, Stage::Idle) {
                        v.stage = Stage::Release;
                    }
                }
            }
            ModuleEvent::AllNotesOff => {
                for v in self.voices.iter_mut() {
                    if !matches!(v.stage, Stage::Idle) {
                        v.stage = Stage::Release;
                    }
                }
            }
            ModuleEvent::Reset => {
                self.voices.fill(Voice::default());
            }
            ModuleEvent::Effect { .. } => {}
        }
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let c = ctx.controllers;
        let volume = c[Self::VOLUME].raw() as f32 / 256.0;
        let waveform = Waveform::from_controller(c[Self::WAVEFORM].raw());
        let (pan_l, pan_r) = pan_gains(c[Self::PANNING].raw());
        let attack = envelope_step(c[Self::ATTACK].raw(), ctx.sample_rate);
        let release = envelope_step(c[Self::RELEASE].raw(), ctx.sample_rate);
        let sr = ctx.sample_rate as f32;

        let [left, right] = &mut ctx.outputs;

        for voice in self.voices.iter_mut() {
            if matches!(voice.stage, Stage::Idle) {
                continue;
            }

            let increment = voice.frequency / sr;
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                match voice.stage {
                    Stage::Attack => {
                        voice.envelope += attack.unwrap_or(1.0);
                        if voice.envelope >= 1.0 {
                            voice.envelope = 1.0;
                            voice.stage = Stage::Sustain;
                        }
                    }
                    Stage::Release => {
                        voice.envelope -= release.unwrap_or(1.0);
                        if voice.envelope <= 0.0 {
                            voice.envelope = 0.0;
                            voice.stage = Stage::Idle;
                            break;
                        }
                    }
                    Stage::Sustain | Stage::Idle => {}
                }

                let s = waveform.sample(voice.phase) * voice.gain * voice.envelope * volume;
                *l += s * pan_l;
                *r += s * pan_r;

                voice.phase += increment;
                voice.phase -= voice.phase.floor();
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controllers(g: &Generator) -> Vec<Controller> {
        g.controllers().into_iter().map(Controller::new).collect()
    }

    fn render(g: &mut Generator, controllers: &[Controller], frames: usize) -> Vec<f32> {
        let silence = vec![0.0f32; frames];
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];
        g.render(&mut RenderContext {
            sample_rate: 44100,
            controllers,
            inputs: [&silence[..], &silence[..]],
            outputs: [&mut left[..], &mut right[..]],
            external: None,
        });
        left
    }

    #[test]
    fn note_on_sounds_and_note_off_silences() {
        let mut g = Generator::new();
        let c = controllers(&g);

        assert!(render(&mut g, &c, 64).iter().all(|s| *s == 0.0));

        g.handle_event(
            &ModuleEvent::NoteOn {
                voice: 3,
                note: 58,
                velocity: 129,
                frequency: 440.0,
            },
            &c,
        );
        assert_eq!(g.active_voices(), 1);
        let out = render(&mut g, &c, 64);
        // Triangle starts at its positive peak, at half volume.
        assert!((out[0] - 0.5).abs() < 1e-6);

        g.handle_event(&ModuleEvent::NoteOff { voice: 3 }, &c);
        let out = render(&mut g, &c, 64);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(g.active_voices(), 0);
    }

    #[test]
    fn release_ramps_down() {
        let mut g = Generator::new();
        let mut c = controllers(&g);
        c[Generator::RELEASE].set(10, CtlScaling::Raw);
        c[Generator::WAVEFORM].set(2, CtlScaling::Raw);

        g.handle_event(
            &ModuleEvent::NoteOn {
                voice: 0,
                note: 1,
                velocity: 129,
                // Far below audible so the square wave stays positive for the whole test.
                frequency: 0.01,
            },
            &c,
        );
        g.handle_event(&ModuleEvent::AllNotesOff, &c);

        // 10ms at 44.1kHz is 441 frames.
        let out = render(&mut g, &c, 600);
        assert!(out[0] > 0.0);
        assert!(out[100] < out[0]);
        assert!(out[500..].iter().all(|s| *s == 0.0));
        assert_eq!(g.active_voices(), 0);
    }
}
