//! Module graph operations on [Engine].
use std::io::Cursor;
use std::path::Path;

use super::Engine;
use crate::error::{ErrorPayload, Result};
use crate::graph::{ModuleFlags, ModuleNode, Position};
use crate::modules::{Controller, ControllerSpec, CtlScaling, ModuleKind, SampleData, Sampler};
use crate::note::NoteEvent;
use crate::project::{ModuleFile, ModuleRecord};

/// A snapshot of one module's description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleInfo {
    pub type_name: &'static str,
    pub kind: ModuleKind,
    pub name: String,
    pub flags: ModuleFlags,
    pub position: Position,
    pub color: u32,
    pub finetune: i32,
    pub relative_note: i32,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
    pub controllers: usize,
}

impl Engine {
    /// Create a module of `type_name` and return its index.  Unconnected until [Engine::connect_module].
    pub fn new_module(&self, slot: usize, type_name: &str, name: &str, x: i32, y: i32, z: i32) -> Result<usize> {
        let handler = self.registry().create(type_name)?;
        let mut node = ModuleNode::new(name, handler);
        node.position = Position { x, y, z };
        let index = self.with_locked_slot(slot, "new_module", |s| s.graph.insert(node))?;
        log::debug!("Slot {slot}: created {type_name} module {index} ({name})");
        Ok(index)
    }

    /// Remove a module and every link touching it.  Other modules keep their indices.
    pub fn remove_module(&self, slot: usize, module: usize) -> Result<()> {
        let removed = self.with_locked_slot(slot, "remove_module", |s| s.graph.remove(module))?;
        // Handlers may own large buffers; free them outside the state mutex.
        drop(removed);
        Ok(())
    }

    /// Route `source`'s output into `destination`.  Connecting twice is a no-op.
    pub fn connect_module(&self, slot: usize, source: usize, destination: usize) -> Result<()> {
        self.with_locked_slot(slot, "connect_module", |s| {
            s.graph.connect(source, destination).map(|_| ())
        })
    }

    /// Remove the link from `source` to `destination`, if any.
    pub fn disconnect_module(&self, slot: usize, source: usize, destination: usize) -> Result<()> {
        self.with_locked_slot(slot, "disconnect_module", |s| {
            s.graph.disconnect(source, destination).map(|_| ())
        })
    }

    /// Load a module document or a WAV file as a new module.  See [Engine::load_module_from_memory].
    pub fn load_module(&self, slot: usize, path: impl AsRef<Path>, x: i32, y: i32, z: i32) -> Result<usize> {
        let data = std::fs::read(path.as_ref())?;
        self.load_module_from_memory(slot, &data, x, y, z)
    }

    /// Create a module from `data`: a module document as written by [Engine::save_module_to_memory], or WAV data, which
    /// becomes a new Sampler holding that sample.
    pub fn load_module_from_memory(&self, slot: usize, data: &[u8], x: i32, y: i32, z: i32) -> Result<usize> {
        let mut node = match ModuleFile::decode(data) {
            Ok(file) => file.module.instantiate(self.registry())?,
            Err(doc_err) => {
                let sample = match SampleData::from_wav(Cursor::new(data)) {
                    Ok(s) => s,
                    Err(wav_err) if data.starts_with(b"RIFF") => return Err(wav_err),
                    Err(_) => return Err(doc_err),
                };
                let mut sampler = Sampler::new();
                sampler.load_sample(sample, None)?;
                ModuleNode::new("Sample", Box::new(sampler))
            }
        };
        node.position = Position { x, y, z };
        self.with_locked_slot(slot, "load_module", |s| s.graph.insert(node))
    }

    /// A module document for `module`: type, metadata and controller values, without links or sample data.
    pub fn save_module_to_memory(&self, slot: usize, module: usize) -> Result<Vec<u8>> {
        let record = self.with_slot(slot, |s| Ok(ModuleRecord::capture(module, s.graph.get(module)?)))?;
        ModuleFile::new(ModuleRecord {
            inputs: vec![],
            ..record
        })
        .encode()
    }

    /// Load a WAV file into a Sampler module.  See [Engine::sampler_load_from_memory].
    pub fn sampler_load(
        &self,
        slot: usize,
        module: usize,
        path: impl AsRef<Path>,
        sample_slot: Option<usize>,
    ) -> Result<()> {
        let file = std::fs::File::open(path.as_ref())?;
        let sample = SampleData::from_wav(std::io::BufReader::new(file))?;
        self.sampler_store(slot, module, sample, sample_slot)
    }

    /// Load WAV data into sample slot `sample_slot` of a Sampler module, or replace all of its samples when `None`.
    pub fn sampler_load_from_memory(
        &self,
        slot: usize,
        module: usize,
        data: &[u8],
        sample_slot: Option<usize>,
    ) -> Result<()> {
        let sample = SampleData::from_wav(Cursor::new(data))?;
        self.sampler_store(slot, module, sample, sample_slot)
    }

    fn sampler_store(&self, slot: usize, module: usize, sample: SampleData, sample_slot: Option<usize>) -> Result<()> {
        let debug = self.debug_output();
        self.with_locked_slot(slot, "sampler_load", |s| {
            let node = s.graph.get_mut(module)?;
            let actual = node.type_name();
            match node.handler.as_any_mut().downcast_mut::<Sampler>() {
                Some(sampler) => sampler.load_sample(sample, sample_slot),
                None => {
                    if debug {
                        log::warn!("Slot {slot}: module {module} is a {actual}, not a {}", Sampler::TYPE_NAME);
                    }
                    Err(ErrorPayload::CapabilityMismatch {
                        expected: Sampler::TYPE_NAME,
                        actual,
                    }
                    .into())
                }
            }
        })
    }

    /// Size of the module index space, holes included.
    pub fn number_of_modules(&self, slot: usize) -> Result<usize> {
        self.with_slot(slot, |s| Ok(s.graph.len()))
    }

    pub fn find_module(&self, slot: usize, name: &str) -> Result<Option<usize>> {
        self.with_slot(slot, |s| Ok(s.graph.find(name)))
    }

    pub fn module_info(&self, slot: usize, module: usize) -> Result<ModuleInfo> {
        self.with_module(slot, module, |n| ModuleInfo {
            type_name: n.type_name(),
            kind: n.kind(),
            name: n.name.clone(),
            flags: n.flags,
            position: n.position,
            color: n.color,
            finetune: n.finetune,
            relative_note: n.relative_note,
            inputs: n.inputs.to_vec(),
            outputs: n.outputs.to_vec(),
            controllers: n.controllers.len(),
        })
    }

    pub fn module_type(&self, slot: usize, module: usize) -> Result<&'static str> {
        self.with_module(slot, module, |n| n.type_name())
    }

    pub fn module_name(&self, slot: usize, module: usize) -> Result<String> {
        self.with_module(slot, module, |n| n.name.clone())
    }

    pub fn module_flags(&self, slot: usize, module: usize) -> Result<ModuleFlags> {
        self.with_module(slot, module, |n| n.flags)
    }

    /// Modules feeding `module`.
    pub fn module_inputs(&self, slot: usize, module: usize) -> Result<Vec<usize>> {
        self.with_module(slot, module, |n| n.inputs.to_vec())
    }

    /// Modules `module` feeds.
    pub fn module_outputs(&self, slot: usize, module: usize) -> Result<Vec<usize>> {
        self.with_module(slot, module, |n| n.outputs.to_vec())
    }

    pub fn module_position(&self, slot: usize, module: usize) -> Result<Position> {
        self.with_module(slot, module, |n| n.position)
    }

    pub fn module_color(&self, slot: usize, module: usize) -> Result<u32> {
        self.with_module(slot, module, |n| n.color)
    }

    pub fn module_finetune(&self, slot: usize, module: usize) -> Result<i32> {
        self.with_module(slot, module, |n| n.finetune)
    }

    pub fn module_relative_note(&self, slot: usize, module: usize) -> Result<i32> {
        self.with_module(slot, module, |n| n.relative_note)
    }

    pub fn set_module_name(&self, slot: usize, module: usize, name: &str) -> Result<()> {
        self.edit_module(slot, module, "set_module_name", |n| n.name = name.to_string())
    }

    pub fn set_module_position(&self, slot: usize, module: usize, position: Position) -> Result<()> {
        self.edit_module(slot, module, "set_module_position", |n| n.position = position)
    }

    /// `color` is 0xBBGGRR.
    pub fn set_module_color(&self, slot: usize, module: usize, color: u32) -> Result<()> {
        self.edit_module(slot, module, "set_module_color", |n| n.color = color & 0xFFFFFF)
    }

    /// Fine pitch offset in 1/256 semitone, clamped to -256..=256.
    pub fn set_module_finetune(&self, slot: usize, module: usize, finetune: i32) -> Result<()> {
        self.edit_module(slot, module, "set_module_finetune", |n| {
            n.finetune = finetune.clamp(-256, 256)
        })
    }

    /// Pitch offset in semitones.
    pub fn set_module_relative_note(&self, slot: usize, module: usize, relative_note: i32) -> Result<()> {
        self.edit_module(slot, module, "set_module_relative_note", |n| {
            n.relative_note = relative_note
        })
    }

    pub fn set_module_mute(&self, slot: usize, module: usize, mute: bool) -> Result<()> {
        self.edit_module(slot, module, "set_module_mute", |n| n.flags.mute = mute)
    }

    /// While any module is soloed, generators that aren't are silent.
    pub fn set_module_solo(&self, slot: usize, module: usize, solo: bool) -> Result<()> {
        self.edit_module(slot, module, "set_module_solo", |n| n.flags.solo = solo)
    }

    /// A bypassed effect passes its input through unchanged.
    pub fn set_module_bypass(&self, slot: usize, module: usize, bypass: bool) -> Result<()> {
        self.edit_module(slot, module, "set_module_bypass", |n| n.flags.bypass = bypass)
    }

    pub fn number_of_module_ctls(&self, slot: usize, module: usize) -> Result<usize> {
        self.with_module(slot, module, |n| n.controllers.len())
    }

    pub fn module_ctl_info(&self, slot: usize, module: usize, ctl: usize) -> Result<ControllerSpec> {
        self.with_controller(slot, module, ctl, |c| c.spec().clone())
    }

    pub fn module_ctl_name(&self, slot: usize, module: usize, ctl: usize) -> Result<&'static str> {
        self.with_controller(slot, module, ctl, |c| c.spec().name)
    }

    pub fn module_ctl_value(&self, slot: usize, module: usize, ctl: usize, scaling: CtlScaling) -> Result<i32> {
        self.with_controller(slot, module, ctl, |c| c.get(scaling))
    }

    /// Set a controller.  Like a pattern controller write, this goes through the event queue and lands at the current
    /// or pinned timestamp.
    pub fn set_module_ctl_value(
        &self,
        slot: usize,
        module: usize,
        ctl: usize,
        value: i32,
        scaling: CtlScaling,
    ) -> Result<()> {
        // Events address controllers with one byte.
        if ctl >= 0xFF {
            return Err(ErrorPayload::NoSuchController {
                module,
                controller: ctl,
            }
            .into());
        }
        let raw = self.with_controller(slot, module, ctl, |c| {
            let mut c = c.clone();
            c.set(value, scaling);
            c.get(CtlScaling::Raw)
        })?;
        self.push_event(slot, 0, NoteEvent::controller(module, ctl, 0), Some(raw))
    }

    /// Copy the latest rendered block of `module`'s output on `channel` into `dest` as 16-bit samples.  Returns the
    /// number of samples written.
    pub fn module_scope(&self, slot: usize, module: usize, channel: usize, dest: &mut [i16]) -> Result<usize> {
        self.with_slot(slot, |s| {
            let frames = s.graph.block_frames();
            let src = s.graph.get(module)?.output(channel, frames);
            let n = src.len().min(dest.len());
            for (d, x) in dest[..n].iter_mut().zip(src.iter()) {
                *d = (x.clamp(-1.0, 1.0) * 32767.0) as i16;
            }
            Ok(n)
        })
    }

    fn with_module<T>(&self, slot: usize, module: usize, f: impl FnOnce(&ModuleNode) -> T) -> Result<T> {
        self.with_slot(slot, |s| Ok(f(s.graph.get(module)?)))
    }

    fn edit_module(
        &self,
        slot: usize,
        module: usize,
        operation: &str,
        f: impl FnOnce(&mut ModuleNode),
    ) -> Result<()> {
        self.with_locked_slot(slot, operation, |s| {
            f(s.graph.get_mut(module)?);
            s.graph.mark_dirty();
            Ok(())
        })
    }

    fn with_controller<T>(
        &self,
        slot: usize,
        module: usize,
        ctl: usize,
        f: impl FnOnce(&Controller) -> T,
    ) -> Result<T> {
        self.with_slot(slot, |s| {
            let c = s
                .graph
                .get(module)?
                .controller(ctl)
                .ok_or(ErrorPayload::NoSuchController {
                    module,
                    controller: ctl,
                })?;
            Ok(f(c))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::modules::{Amplifier, ModuleEvent, ModuleHandler, RenderContext};
    use crate::EngineConfig;

    fn engine() -> Engine {
        let e = Engine::new(EngineConfig::default()).unwrap();
        e.open_slot(0).unwrap();
        e
    }

    #[test]
    fn capability_mismatch_names_both_types() {
        let e = engine();
        let amp = e.new_module(0, "Amplifier", "amp", 0, 0, 0).unwrap();
        let mut wav = Cursor::new(vec![]);
        {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: 8000,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut w = hound::WavWriter::new(&mut wav, spec).unwrap();
            w.write_sample(1000i16).unwrap();
            w.finalize().unwrap();
        }
        let err = e
            .sampler_load_from_memory(0, amp, wav.get_ref(), None)
            .unwrap_err();
        assert!(err.is_capability_mismatch());
        assert!(err.to_string().contains("Amplifier"));
    }

    #[test]
    fn unknown_types_and_reserved_output() {
        let e = engine();
        assert!(e
            .new_module(0, "Theremin", "", 0, 0, 0)
            .unwrap_err()
            .is_unknown_module_type());
        assert!(e.new_module(0, "Output", "", 0, 0, 0).is_err());
        assert!(e.remove_module(0, 0).is_err());
    }

    #[test]
    fn controller_writes_arrive_through_rendering() {
        let e = engine();
        let amp = e.new_module(0, "Amplifier", "amp", 0, 0, 0).unwrap();
        e.set_module_ctl_value(0, amp, 0, 512, CtlScaling::Raw).unwrap();
        assert_eq!(e.module_ctl_value(0, amp, 0, CtlScaling::Raw).unwrap(), 256);

        let mut out = vec![0.0f32; 64];
        e.render(crate::OutputBuffer::F32(&mut out), 0, e.ticks()).unwrap();
        assert_eq!(e.module_ctl_value(0, amp, 0, CtlScaling::Raw).unwrap(), 512);
        assert!(e
            .module_ctl_value(0, amp, 99, CtlScaling::Raw)
            .unwrap_err()
            .is_invalid_handle());
    }

    /// An amplifier whose only controller spans a range far wider than the normalized domain.
    struct WideRange(Amplifier);

    impl ModuleHandler for WideRange {
        fn type_name(&self) -> &'static str {
            "WideRange"
        }

        fn kind(&self) -> ModuleKind {
            self.0.kind()
        }

        fn controllers(&self) -> Vec<ControllerSpec> {
            vec![ControllerSpec::new("Length", 0, 1_000_000, 0)]
        }

        fn handle_event(&mut self, event: &ModuleEvent, controllers: &[Controller]) {
            self.0.handle_event(event, controllers)
        }

        fn render(&mut self, _ctx: &mut RenderContext<'_>) {}

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[test]
    fn wide_controllers_keep_exact_values() {
        let mut registry = crate::ModuleRegistry::with_builtins();
        registry.register("WideRange", || Box::new(WideRange(Amplifier::new())));
        let e = Engine::with_parts(
            EngineConfig::default(),
            registry,
            std::sync::Arc::new(crate::time::MonotonicClock::new()),
        )
        .unwrap();
        e.open_slot(0).unwrap();
        let m = e.new_module(0, "WideRange", "wide", 0, 0, 0).unwrap();

        e.set_module_ctl_value(0, m, 0, 123_457, CtlScaling::Raw).unwrap();
        let mut out = vec![0.0f32; 64];
        e.render(crate::OutputBuffer::F32(&mut out), 0, e.ticks()).unwrap();
        assert_eq!(e.module_ctl_value(0, m, 0, CtlScaling::Raw).unwrap(), 123_457);
    }

    #[test]
    fn module_documents_make_new_modules() {
        let e = engine();
        let amp = e.new_module(0, "Amplifier", "amp", 1, 2, 3).unwrap();
        e.set_module_color(0, amp, 0x123456).unwrap();
        e.connect_module(0, amp, 0).unwrap();
        let doc = e.save_module_to_memory(0, amp).unwrap();

        let copy = e.load_module_from_memory(0, &doc, 9, 9, 0).unwrap();
        let info = e.module_info(0, copy).unwrap();
        assert_eq!(info.type_name, "Amplifier");
        assert_eq!(info.color, 0x123456);
        assert_eq!(info.position, Position { x: 9, y: 9, z: 0 });
        assert!(info.inputs.is_empty() && info.outputs.is_empty());

        assert!(e.load_module_from_memory(0, b"garbage", 0, 0, 0).is_err());
    }
}
