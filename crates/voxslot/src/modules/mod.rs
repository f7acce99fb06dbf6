//! The render capability behind every module, and the registry that creates handlers by type name.
mod amplifier;
mod generator;
mod input;
mod output;
mod sampler;

pub use amplifier::Amplifier;
pub use generator::{Generator, Waveform};
pub use input::Input;
pub use output::Output;
pub use sampler::{SampleData, Sampler};

use std::any::Any;

use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};

use crate::config::MAX_CONTROLLER_VALUE;
use crate::error::{ErrorPayload, Result};

/// What a module does in the graph.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, derive_more::Display, derive_more::IsVariant)]
pub enum ModuleKind {
    /// The slot's sink.  Exactly one, at index 0.
    Output,
    /// Produces sound from events, ignoring its inputs.
    Generator,
    /// Processes its inputs.
    Effect,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ControllerKind {
    #[default]
    Normal,
    /// Chooses among a small set of named alternatives.
    Selector,
}

/// Static description of one module controller.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ControllerSpec {
    pub name: &'static str,
    pub min: i32,
    pub max: i32,
    pub default: i32,
    /// Added to the raw value for display, e.g. -128 to show panning as -128..128.
    pub offset: i32,
    pub kind: ControllerKind,
    pub group: u8,
}

impl ControllerSpec {
    pub const fn new(name: &'static str, min: i32, max: i32, default: i32) -> Self {
        ControllerSpec {
            name,
            min,
            max,
            default,
            offset: 0,
            kind: ControllerKind::Normal,
            group: 0,
        }
    }

    pub const fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    pub const fn selector(mut self) -> Self {
        self.kind = ControllerKind::Selector;
        self
    }

    pub const fn in_group(mut self, group: u8) -> Self {
        self.group = group;
        self
    }
}

/// Which representation a controller value is read or written in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CtlScaling {
    /// The controller's own `min..=max` integer domain.
    Raw,
    /// `0..=0x8000` spread over `min..=max`, as pattern events carry it.
    Normalized,
    /// Raw plus the display offset.
    Display,
}

/// A controller's description and live value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Controller {
    spec: ControllerSpec,
    value: i32,
}

impl Controller {
    pub fn new(spec: ControllerSpec) -> Self {
        let value = spec.default.clamp(spec.min, spec.max);
        Controller { spec, value }
    }

    pub fn spec(&self) -> &ControllerSpec {
        &self.spec
    }

    pub fn raw(&self) -> i32 {
        self.value
    }

    pub fn get(&self, scaling: CtlScaling) -> i32 {
        let spec = &self.spec;
        match scaling {
            CtlScaling::Raw => self.value,
            CtlScaling::Display => self.value + spec.offset,
            CtlScaling::Normalized => {
                let range = (spec.max - spec.min) as i64;
                if range == 0 {
                    return 0;
                }
                ((self.value - spec.min) as i64 * MAX_CONTROLLER_VALUE as i64 / range) as i32
            }
        }
    }

    /// Set from `value` in the given representation, clamping to `min..=max`.
    pub fn set(&mut self, value: i32, scaling: CtlScaling) {
        let spec = &self.spec;
        let raw = match scaling {
            CtlScaling::Raw => value as i64,
            CtlScaling::Display => value as i64 - spec.offset as i64,
            CtlScaling::Normalized => {
                let v = (value as i64).clamp(0, MAX_CONTROLLER_VALUE as i64);
                // Round to nearest so a normalized round trip lands back on the same raw value.
                spec.min as i64
                    + (v * (spec.max - spec.min) as i64 + MAX_CONTROLLER_VALUE as i64 / 2)
                        / MAX_CONTROLLER_VALUE as i64
            }
        };
        self.value = raw.clamp(spec.min as i64, spec.max as i64) as i32;
    }

    /// Raw value mapped to `0.0..=1.0`.
    pub fn unit(&self) -> f32 {
        let range = self.spec.max - self.spec.min;
        if range == 0 {
            return 0.0;
        }
        (self.value - self.spec.min) as f32 / range as f32
    }
}

/// Events a module receives from the router.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ModuleEvent {
    NoteOn {
        voice: usize,
        note: u8,
        velocity: u8,
        /// Already shifted by the module's finetune and relative note.
        frequency: f32,
    },
    NoteOff {
        voice: usize,
    },
    AllNotesOff,
    /// Drop all internal state, as if freshly created.
    Reset,
    /// An effect code the router doesn't handle itself.
    Effect {
        voice: usize,
        effect: u8,
        value: u16,
    },
}

/// Everything a handler sees while rendering one chunk.
///
/// All slices have the same length: the chunk's frame count.
pub struct RenderContext<'a> {
    pub sample_rate: u32,
    pub controllers: &'a [Controller],
    /// Sum of everything connected to this module.
    pub inputs: [&'a [f32]; 2],
    /// Zeroed by the caller.
    pub outputs: [&'a mut [f32]; 2],
    /// The externally supplied block when rendering as a filter.
    pub external: Option<[&'a [f32]; 2]>,
}

/// A module's render capability.
///
/// Handlers are created once per module and then only driven through this trait from the slot that owns them.
pub trait ModuleHandler: Send + 'static {
    fn type_name(&self) -> &'static str;

    fn kind(&self) -> ModuleKind;

    /// The controllers a new module of this type starts with.
    fn controllers(&self) -> Vec<ControllerSpec>;

    fn handle_event(&mut self, event: &ModuleEvent, controllers: &[Controller]);

    fn render(&mut self, ctx: &mut RenderContext<'_>);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub type ModuleFactory = Box<dyn Fn() -> Box<dyn ModuleHandler> + Send + Sync>;

/// Maps type names to handler factories.  Consulted only when modules are created.
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// A registry without any types.
    pub fn empty() -> Self {
        ModuleRegistry {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in types: `Generator`, `Amplifier`, `Sampler` and `Input`.
    pub fn with_builtins() -> Self {
        let mut ret = Self::empty();
        ret.register(Generator::TYPE_NAME, || Box::new(Generator::new()));
        ret.register(Amplifier::TYPE_NAME, || Box::new(Amplifier::new()));
        ret.register(Sampler::TYPE_NAME, || Box::new(Sampler::new()));
        ret.register(Input::TYPE_NAME, || Box::new(Input::new()));
        ret
    }

    /// Register a module type, replacing any previous registration under the same name.
    ///
    /// `Output` is reserved and cannot be registered.
    pub fn register<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn() -> Box<dyn ModuleHandler> + Send + Sync + 'static,
    {
        if type_name == Output::TYPE_NAME {
            log::warn!("Ignoring attempt to register a module type named {type_name}");
            return;
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, type_name: &str) -> Result<Box<dyn ModuleHandler>> {
        if type_name == Output::TYPE_NAME {
            return Err(ErrorPayload::ReservedModule(0).into());
        }
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| ErrorPayload::UnknownModuleType(type_name.to_string()))?;
        Ok(factory())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Stereo gains for a raw panning value where `0..=256` sweeps left to right and 128 is center.
pub(crate) fn pan_gains(pan: i32) -> (f32, f32) {
    let pan = pan.clamp(0, 256) as f32;
    let left = ((256.0 - pan) / 128.0).min(1.0);
    let right = (pan / 128.0).min(1.0);
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    impl std::fmt::Debug for dyn ModuleHandler {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.type_name())
        }
    }

    #[test]
    fn controller_scaling() {
        let mut c = Controller::new(ControllerSpec::new("Panning", 0, 256, 128).with_offset(-128));
        assert_eq!(c.get(CtlScaling::Raw), 128);
        assert_eq!(c.get(CtlScaling::Display), 0);
        assert_eq!(c.get(CtlScaling::Normalized), 0x4000);

        c.set(0x8000, CtlScaling::Normalized);
        assert_eq!(c.raw(), 256);

        c.set(-64, CtlScaling::Display);
        assert_eq!(c.raw(), 64);

        c.set(1000, CtlScaling::Raw);
        assert_eq!(c.raw(), 256);
        c.set(-1000, CtlScaling::Raw);
        assert_eq!(c.raw(), 0);
    }

    #[test]
    fn normalized_round_trip_on_small_ranges() {
        let mut c = Controller::new(ControllerSpec::new("Waveform", 0, 3, 0).selector());
        for raw in 0..=3 {
            c.set(raw, CtlScaling::Raw);
            let n = c.get(CtlScaling::Normalized);
            c.set(n, CtlScaling::Normalized);
            assert_eq!(c.raw(), raw);
        }
    }

    #[test]
    fn registry() {
        let reg = ModuleRegistry::with_builtins();
        assert_eq!(reg.create("Generator").unwrap().type_name(), "Generator");
        assert!(reg.create("Flanger").unwrap_err().is_unknown_module_type());
        assert!(reg.create("Output").is_err());

        let mut reg = ModuleRegistry::empty();
        reg.register("Output", || Box::new(Output::new()));
        assert!(!reg.contains("Output"));
    }

    #[test]
    fn panning() {
        assert_eq!(pan_gains(128), (1.0, 1.0));
        assert_eq!(pan_gains(0), (1.0, 0.0));
        assert_eq!(pan_gains(256), (0.0, 1.0));
    }
}
