//! Project and module documents.
//!
//! Both are JSON.  A project holds everything about a slot except live state (transport position, voices, queued
//! events) and sample data.  Loading builds a complete slot first and only then hands it over, so a document that
//! fails validation anywhere leaves the target slot as it was.
use serde::{Deserialize, Serialize};

use crate::error::{ErrorPayload, Result};
use crate::graph::{ModuleFlags, ModuleNode, Position, OUTPUT_MODULE};
use crate::modules::{CtlScaling, ModuleRegistry, Output};
use crate::note::NoteEvent;
use crate::pattern::Pattern;
use crate::slot::SlotEngine;

pub(crate) const PROJECT_FORMAT: &str = "voxslot-project";
pub(crate) const MODULE_FORMAT: &str = "voxslot-module";
pub(crate) const FORMAT_VERSION: u32 = 1;

fn invalid(message: String) -> crate::Error {
    ErrorPayload::InvalidProject(message).into()
}

fn default_color() -> u32 {
    0xFFFFFF
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ModuleRecord {
    #[serde(default)]
    pub(crate) index: usize,
    #[serde(rename = "type")]
    pub(crate) type_name: String,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) x: i32,
    #[serde(default)]
    pub(crate) y: i32,
    #[serde(default)]
    pub(crate) z: i32,
    #[serde(default = "default_color")]
    pub(crate) color: u32,
    #[serde(default)]
    pub(crate) finetune: i32,
    #[serde(default)]
    pub(crate) relative_note: i32,
    #[serde(default)]
    pub(crate) flags: ModuleFlags,
    /// Raw controller values in controller order.
    #[serde(default)]
    pub(crate) controllers: Vec<i32>,
    #[serde(default)]
    pub(crate) inputs: Vec<usize>,
}

impl ModuleRecord {
    pub(crate) fn capture(index: usize, node: &ModuleNode) -> Self {
        ModuleRecord {
            index,
            type_name: node.type_name().to_string(),
            name: node.name.clone(),
            x: node.position.x,
            y: node.position.y,
            z: node.position.z,
            color: node.color,
            finetune: node.finetune,
            relative_note: node.relative_note,
            flags: node.flags,
            controllers: node.controllers.iter().map(|c| c.raw()).collect(),
            inputs: node.inputs.to_vec(),
        }
    }

    /// Copy everything but type and links onto `node`.
    fn apply_to(&self, node: &mut ModuleNode) {
        node.name = self.name.clone();
        node.position = Position {
            x: self.x,
            y: self.y,
            z: self.z,
        };
        node.color = self.color;
        node.finetune = self.finetune.clamp(-256, 256);
        node.relative_note = self.relative_note;
        node.flags = self.flags;
        for (c, v) in node.controllers.iter_mut().zip(self.controllers.iter()) {
            c.set(*v, CtlScaling::Raw);
        }
    }

    /// A new module from this record, without links.
    pub(crate) fn instantiate(&self, registry: &ModuleRegistry) -> Result<ModuleNode> {
        let handler = registry.create(&self.type_name)?;
        let mut node = ModuleNode::new(self.name.clone(), handler);
        self.apply_to(&mut node);
        Ok(node)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct CellRecord {
    pub(crate) track: usize,
    pub(crate) line: usize,
    #[serde(flatten)]
    pub(crate) event: NoteEvent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct PatternRecord {
    pub(crate) index: usize,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) x: i32,
    #[serde(default)]
    pub(crate) y: i32,
    pub(crate) tracks: usize,
    pub(crate) lines: usize,
    #[serde(default)]
    pub(crate) muted: bool,
    #[serde(default)]
    pub(crate) cells: Vec<CellRecord>,
}

impl PatternRecord {
    fn capture(index: usize, pattern: &Pattern) -> Self {
        let tracks = pattern.tracks();
        let cells = pattern
            .data()
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_empty())
            .map(|(i, e)| CellRecord {
                track: i % tracks,
                line: i / tracks,
                event: *e,
            })
            .collect();
        PatternRecord {
            index,
            name: pattern.name.clone(),
            x: pattern.x,
            y: pattern.y,
            tracks,
            lines: pattern.lines(),
            muted: pattern.muted,
            cells,
        }
    }

    fn build(&self) -> Result<Pattern> {
        let mut pattern = Pattern::new(self.tracks, self.lines, self.x, self.y, self.name.clone())
            .map_err(|e| invalid(format!("pattern {}: {}", self.index, e)))?;
        pattern.muted = self.muted;
        for cell in self.cells.iter() {
            *pattern
                .cell_mut(cell.track, cell.line)
                .map_err(|e| invalid(format!("pattern {}: {}", self.index, e)))? = cell.event;
        }
        Ok(pattern)
    }
}

fn default_bpm() -> u16 {
    crate::config::DEFAULT_BPM
}

fn default_speed() -> u16 {
    crate::config::DEFAULT_SPEED
}

fn default_volume() -> u16 {
    crate::config::MAX_VOLUME
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ProjectFile {
    pub(crate) format: String,
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default = "default_bpm")]
    pub(crate) bpm: u16,
    #[serde(default = "default_speed")]
    pub(crate) speed: u16,
    #[serde(default = "default_volume")]
    pub(crate) volume: u16,
    #[serde(default = "default_true")]
    pub(crate) autostop: bool,
    #[serde(default)]
    pub(crate) modules: Vec<ModuleRecord>,
    #[serde(default)]
    pub(crate) patterns: Vec<PatternRecord>,
}

fn check_format(format: &str, version: u32, expected: &str) -> Result<()> {
    if format != expected {
        return Err(invalid(format!("expected a {expected} document, found {format}")));
    }
    if version > FORMAT_VERSION {
        return Err(invalid(format!(
            "{expected} version {version} is newer than the supported version {FORMAT_VERSION}"
        )));
    }
    Ok(())
}

impl ProjectFile {
    pub(crate) fn capture(slot: &SlotEngine) -> Self {
        ProjectFile {
            format: PROJECT_FORMAT.to_string(),
            version: FORMAT_VERSION,
            name: slot.name.clone(),
            bpm: slot.transport.bpm(),
            speed: slot.transport.speed(),
            volume: slot.volume,
            autostop: slot.transport.autostop,
            modules: slot
                .graph
                .iter()
                .map(|(i, n)| ModuleRecord::capture(i, n))
                .collect(),
            patterns: slot
                .timeline
                .iter()
                .map(|(i, p)| PatternRecord::capture(i, p))
                .collect(),
        }
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        let file: ProjectFile = serde_json::from_slice(bytes)?;
        check_format(&file.format, file.version, PROJECT_FORMAT)?;
        Ok(file)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Build a stopped slot from this document, validating all of it.
    pub(crate) fn build(
        &self,
        registry: &ModuleRegistry,
        sample_rate: u32,
        ticks_per_second: u32,
    ) -> Result<SlotEngine> {
        let mut slot = SlotEngine::new(sample_rate, ticks_per_second);
        slot.name = self.name.clone();
        slot.transport.set_bpm(self.bpm);
        slot.transport.set_speed(self.speed);
        slot.transport.autostop = self.autostop;
        slot.volume = self.volume.min(crate::config::MAX_VOLUME);

        for record in self.modules.iter() {
            if record.index == OUTPUT_MODULE {
                if record.type_name != Output::TYPE_NAME {
                    return Err(invalid(format!(
                        "module 0 must be the Output module, found {}",
                        record.type_name
                    )));
                }
                record.apply_to(slot.graph.get_mut(OUTPUT_MODULE)?);
                continue;
            }
            let node = record
                .instantiate(registry)
                .map_err(|e| invalid(format!("module {}: {}", record.index, e)))?;
            slot.graph.insert_at(record.index, node)?;
        }

        for record in self.modules.iter() {
            for &source in record.inputs.iter() {
                if source == record.index {
                    return Err(invalid(format!("module {source} is linked to itself")));
                }
                slot.graph
                    .connect(source, record.index)
                    .map_err(|e| invalid(format!("link {} -> {}: {}", source, record.index, e)))?;
            }
        }

        for record in self.patterns.iter() {
            slot.timeline.insert_at(record.index, record.build()?)?;
        }

        Ok(slot)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ModuleFile {
    pub(crate) format: String,
    pub(crate) version: u32,
    pub(crate) module: ModuleRecord,
}

impl ModuleFile {
    pub(crate) fn new(module: ModuleRecord) -> Self {
        ModuleFile {
            format: MODULE_FORMAT.to_string(),
            version: FORMAT_VERSION,
            module,
        }
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        let file: ModuleFile = serde_json::from_slice(bytes)?;
        check_format(&file.format, file.version, MODULE_FORMAT)?;
        Ok(file)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::config::TICKS_PER_SECOND;
    use crate::modules::Generator;

    fn sample_slot() -> SlotEngine {
        let mut slot = SlotEngine::new(44100, TICKS_PER_SECOND);
        slot.name = "demo".into();
        slot.transport.set_bpm(140);
        let mut node = ModuleNode::new("lead", Box::new(Generator::new()));
        node.color = 0x00FF00;
        node.controllers[0].set(200, CtlScaling::Raw);
        let gen = slot.graph.insert(node).unwrap();
        slot.graph.connect(gen, 0).unwrap();

        let mut pattern = Pattern::new(4, 16, 0, 0, "intro").unwrap();
        *pattern.cell_mut(2, 5).unwrap() = NoteEvent::note_on(61, 100, gen);
        slot.timeline.insert(pattern);
        slot
    }

    #[test]
    fn documents_rebuild_the_same_slot() {
        let registry = ModuleRegistry::with_builtins();
        let original = ProjectFile::capture(&sample_slot());
        let bytes = original.encode().unwrap();
        let decoded = ProjectFile::decode(&bytes).unwrap();
        assert_eq!(decoded, original);

        let rebuilt = decoded.build(&registry, 44100, TICKS_PER_SECOND).unwrap();
        assert_eq!(ProjectFile::capture(&rebuilt), original);
        assert!(!rebuilt.transport.is_playing());
        assert_eq!(original.patterns[0].cells.len(), 1);
    }

    #[test]
    fn sparse_documents_take_defaults() {
        let json = br#"{"format":"voxslot-project","version":1,
            "modules":[{"index":3,"type":"Amplifier","inputs":[]},{"index":0,"type":"Output","inputs":[3]}],
            "patterns":[{"index":0,"tracks":1,"lines":8,"cells":[{"track":0,"line":7,"note":60,"module":4}]}]}"#;
        let slot = ProjectFile::decode(json)
            .unwrap()
            .build(&ModuleRegistry::with_builtins(), 44100, TICKS_PER_SECOND)
            .unwrap();
        assert_eq!(slot.transport.bpm(), 125);
        assert_eq!(slot.graph.len(), 4);
        assert_eq!(slot.graph.get(0).unwrap().inputs.to_vec(), vec![3]);
        assert_eq!(slot.timeline.event(0, 0, 7).unwrap().note, 60);
    }

    #[test]
    fn invalid_documents_are_rejected() {
        let registry = ModuleRegistry::with_builtins();
        let cases: &[&[u8]] = &[
            br#"{"format":"something-else","version":1}"#,
            br#"{"format":"voxslot-project","version":99}"#,
            br#"{"format":"voxslot-project","version":1,"modules":[{"index":1,"type":"Theremin"}]}"#,
            br#"{"format":"voxslot-project","version":1,"modules":[{"index":0,"type":"Output","inputs":[5]}]}"#,
            br#"{"format":"voxslot-project","version":1,"modules":[{"index":1,"type":"Output"}]}"#,
            br#"{"format":"voxslot-project","version":1,"patterns":[{"index":0,"tracks":0,"lines":4}]}"#,
            br#"{"format":"voxslot-project","version":1,"patterns":[{"index":0,"tracks":1,"lines":4,"cells":[{"track":1,"line":0}]}]}"#,
            br#"{"format":"voxslot-project","version":1,"patterns":[{"index":0,"tracks":1,"lines":4},{"index":0,"tracks":1,"lines":4}]}"#,
            b"not json",
        ];
        for case in cases {
            let result = ProjectFile::decode(case)
                .and_then(|f| f.build(&registry, 44100, TICKS_PER_SECOND).map(|_| ()));
            let err = result.unwrap_err();
            assert!(err.is_load_failure(), "{err}");
        }
    }

    #[test]
    fn module_documents() {
        let slot = sample_slot();
        let record = ModuleRecord::capture(1, slot.graph.get(1).unwrap());
        let bytes = ModuleFile::new(record.clone()).encode().unwrap();
        let decoded = ModuleFile::decode(&bytes).unwrap();
        assert_eq!(decoded.module, record);

        let node = decoded
            .module
            .instantiate(&ModuleRegistry::with_builtins())
            .unwrap();
        assert_eq!(node.controllers[0].raw(), 200);
        assert_eq!(node.color, 0x00FF00);
        assert!(node.inputs.is_empty());
    }
}
