#![allow(dead_code)]
use std::sync::Arc;

use voxslot::*;

/// 20 ticks per frame at the default tick rate, so frame offsets are easy to turn into timestamps.
pub const SR: u32 = 50_000;
pub const TICKS_PER_FRAME: u32 = 20;

pub struct Harness {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A mono float engine on a manual clock.
pub fn harness() -> Harness {
    harness_with(
        EngineConfig::builder()
            .sample_rate(SR)
            .channels(1)
            .build()
            .unwrap(),
    )
}

pub fn harness_with(config: EngineConfig) -> Harness {
    init_logging();
    let clock = Arc::new(ManualClock::new(Ticks(0)));
    let engine = Engine::with_parts(config, ModuleRegistry::with_builtins(), clock.clone()).unwrap();
    Harness { engine, clock }
}

impl Harness {
    /// Open `slot` with a generator wired to the output.  Returns the generator's index.
    pub fn slot_with_generator(&self, slot: usize) -> usize {
        let e = &self.engine;
        e.open_slot(slot).unwrap();
        let _lock = e.lock(slot).unwrap();
        let gen = e.new_module(slot, "Generator", "gen", 0, 0, 0).unwrap();
        e.connect_module(slot, gen, OUTPUT_MODULE).unwrap();
        gen
    }

    /// Render `frames` mono frames heard at the clock's current time, then advance the clock past them.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames * self.engine.config().channels];
        self.engine
            .render(OutputBuffer::F32(&mut out), 0, self.clock.now())
            .unwrap();
        self.clock.advance_frames(frames, self.engine.config().sample_rate);
        out
    }
}

pub fn first_sound(samples: &[f32]) -> Option<usize> {
    samples.iter().position(|s| *s != 0.0)
}
