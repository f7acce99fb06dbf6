//! A multi-slot real-time synthesis engine.
//!
//! An [Engine] owns a fixed pool of slots.  Each open slot is an independent synthesizer: a graph of modules feeding
//! the Output module, a timeline of patterns, and a transport playing through them.  Control threads edit slots and
//! send live events; a render thread (a device callback, or the client calling [Engine::render]) pulls mixed audio
//! from every running slot.  Slots can be started in sample-accurate sync with one another through the stop effect.
#[macro_use]
#[allow(unused_macros)]
mod logging;

pub mod config;
#[cfg(feature = "device")]
mod device;
mod dispatcher;
mod engine;
mod error;
mod graph;
mod is_render_thread;
pub mod modules;
mod note;
mod pattern;
mod project;
mod render_gate;
mod router;
mod slot;
mod time;
mod transport;

pub use config::{EngineConfig, EngineConfigBuilder, SampleFormat};
#[cfg(feature = "device")]
pub use device::{AudioDevice, AudioDeviceError};
pub use dispatcher::{InputBuffer, OutputBuffer};
pub use engine::{version, Engine, ModuleInfo, SlotLock};
pub use error::{Error, Result};
pub use graph::{ModuleFlags, Position, OUTPUT_MODULE};
pub use modules::{ControllerKind, ControllerSpec, CtlScaling, ModuleKind, ModuleRegistry};
pub use note::{
    effect, note_frequency, EventField, EventPatch, NoteCommand, NoteEvent, A4_NOTE,
    DEFAULT_VELOCITY, FIRST_NOTE_COMMAND,
};
pub use pattern::Pattern;
pub use time::{
    frames_for_ticks, ticks_for_frames, LinePosition, ManualClock, MonotonicClock, Ticks,
    TimeSource,
};
pub use transport::TransportState;
