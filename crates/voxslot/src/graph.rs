//! The module graph of one slot.
//!
//! Modules live in an arena indexed by module number.  Removal leaves a hole, so indices held by clients stay valid for
//! every other module, and scrubs the removed index from every surviving link list.  Links are stored on both ends: a
//! module's `inputs` lists its sources and its `outputs` lists its destinations.
//!
//! Rendering visits modules reachable from the Output module (index 0) through input links, dependencies first.  The
//! traversal tracks which modules are on the stack, so malformed graphs with cycles still render: the edge closing the
//! cycle is ignored for that pass.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::{MAX_BLOCK_FRAMES, MAX_MODULES};
use crate::error::{ErrorPayload, Result};
use crate::modules::{
    Controller, CtlScaling, ModuleEvent, ModuleHandler, ModuleKind, Output, RenderContext,
};
use crate::note::note_frequency;

pub const OUTPUT_MODULE: usize = 0;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ModuleFlags {
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub bypass: bool,
}

/// Layout position.  Has no effect on sound.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

pub(crate) type Links = SmallVec<[usize; 4]>;

pub(crate) struct ModuleNode {
    pub(crate) name: String,
    pub(crate) handler: Box<dyn ModuleHandler>,
    pub(crate) flags: ModuleFlags,
    pub(crate) position: Position,
    /// 0xBBGGRR.
    pub(crate) color: u32,
    /// In 1/256 semitone, -256..=256.
    pub(crate) finetune: i32,
    pub(crate) relative_note: i32,
    pub(crate) inputs: Links,
    pub(crate) outputs: Links,
    pub(crate) controllers: Vec<Controller>,
    /// Output of the current (or most recently rendered) block.
    out: [Vec<f32>; 2],
    peak: [f32; 2],
}

impl ModuleNode {
    pub(crate) fn new(name: impl Into<String>, handler: Box<dyn ModuleHandler>) -> Self {
        let controllers = handler
            .controllers()
            .into_iter()
            .map(Controller::new)
            .collect();
        ModuleNode {
            name: name.into(),
            handler,
            flags: Default::default(),
            position: Default::default(),
            color: 0xFFFFFF,
            finetune: 0,
            relative_note: 0,
            inputs: Links::new(),
            outputs: Links::new(),
            controllers,
            out: [vec![0.0; MAX_BLOCK_FRAMES], vec![0.0; MAX_BLOCK_FRAMES]],
            peak: [0.0; 2],
        }
    }

    pub(crate) fn kind(&self) -> ModuleKind {
        self.handler.kind()
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.handler.type_name()
    }

    pub(crate) fn controller(&self, index: usize) -> Option<&Controller> {
        self.controllers.get(index)
    }

    pub(crate) fn output(&self, channel: usize, frames: usize) -> &[f32] {
        &self.out[channel.min(1)][..frames.min(MAX_BLOCK_FRAMES)]
    }

    fn send(&mut self, event: &ModuleEvent) {
        self.handler.handle_event(event, &self.controllers);
    }
}

pub(crate) struct ModuleGraph {
    nodes: Vec<Option<ModuleNode>>,
    order: Vec<usize>,
    order_dirty: bool,
    /// Frames of the block being rendered.
    block_frames: usize,
    input_sum: [Vec<f32>; 2],
}

impl ModuleGraph {
    pub(crate) fn new() -> Self {
        let mut output = ModuleNode::new("Output", Box::new(Output::new()));
        output.position = Position { x: 512, y: 512, z: 0 };
        ModuleGraph {
            nodes: vec![Some(output)],
            order: Vec::with_capacity(64),
            order_dirty: true,
            block_frames: 0,
            input_sum: [vec![0.0; MAX_BLOCK_FRAMES], vec![0.0; MAX_BLOCK_FRAMES]],
        }
    }

    /// Length of the arena, holes included.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn get(&self, index: usize) -> Result<&ModuleNode> {
        self.nodes
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| ErrorPayload::NoSuchModule(index).into())
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Result<&mut ModuleNode> {
        self.nodes
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or_else(|| ErrorPayload::NoSuchModule(index).into())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &ModuleNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (i, n)))
    }

    /// Add a module at the lowest free index.
    pub(crate) fn insert(&mut self, node: ModuleNode) -> Result<usize> {
        let index = match self.nodes.iter().skip(1).position(Option::is_none) {
            Some(hole) => hole + 1,
            None if self.nodes.len() < MAX_MODULES => {
                self.nodes.push(None);
                self.nodes.len() - 1
            }
            None => return Err(ErrorPayload::ModuleLimit.into()),
        };
        self.nodes[index] = Some(node);
        self.order_dirty = true;
        Ok(index)
    }

    /// Put a module at a specific free index, growing the arena with holes if needed.
    pub(crate) fn insert_at(&mut self, index: usize, node: ModuleNode) -> Result<()> {
        if index == OUTPUT_MODULE {
            return Err(ErrorPayload::ReservedModule(index).into());
        }
        if index >= MAX_MODULES {
            return Err(ErrorPayload::ModuleLimit.into());
        }
        if self.nodes.len() <= index {
            self.nodes.resize_with(index + 1, || None);
        }
        if self.nodes[index].is_some() {
            return Err(ErrorPayload::InvalidProject(format!("module {index} defined twice")).into());
        }
        self.nodes[index] = Some(node);
        self.order_dirty = true;
        Ok(())
    }

    pub(crate) fn remove(&mut self, index: usize) -> Result<ModuleNode> {
        if index == OUTPUT_MODULE {
            return Err(ErrorPayload::ReservedModule(index).into());
        }
        let node = self
            .nodes
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(ErrorPayload::NoSuchModule(index))?;

        for other in node.inputs.iter().chain(node.outputs.iter()) {
            if let Some(Some(other)) = self.nodes.get_mut(*other) {
                other.inputs.retain(|x| *x != index);
                other.outputs.retain(|x| *x != index);
            }
        }

        // Trailing holes carry no information.
        while self.nodes.len() > 1 && matches!(self.nodes.last(), Some(None)) {
            self.nodes.pop();
        }

        self.order_dirty = true;
        Ok(node)
    }

    /// Link `source`'s output into `destination`'s input.  Returns whether a link was added.
    pub(crate) fn connect(&mut self, source: usize, destination: usize) -> Result<bool> {
        self.get(source)?;
        self.get(destination)?;

        if self.get(destination)?.inputs.contains(&source) {
            return Ok(false);
        }

        self.get_mut(destination)?.inputs.push(source);
        self.get_mut(source)?.outputs.push(destination);
        self.order_dirty = true;
        Ok(true)
    }

    /// Remove the link from `source` to `destination`.  Returns whether there was one.
    pub(crate) fn disconnect(&mut self, source: usize, destination: usize) -> Result<bool> {
        self.get(source)?;
        self.get(destination)?;

        let dest = self.get_mut(destination)?;
        let before = dest.inputs.len();
        dest.inputs.retain(|x| *x != source);
        let removed = dest.inputs.len() != before;

        self.get_mut(source)?.outputs.retain(|x| *x != destination);
        self.order_dirty |= removed;
        Ok(removed)
    }

    pub(crate) fn find(&self, name: &str) -> Option<usize> {
        self.iter().find(|(_, n)| n.name == name).map(|(i, _)| i)
    }

    /// Modules in render order: every module after the modules feeding it, ending with the Output module.
    pub(crate) fn render_order(&mut self) -> &[usize] {
        if self.order_dirty {
            self.rebuild_order();
            self.order_dirty = false;
        }
        &self.order
    }

    fn rebuild_order(&mut self) {
        #[derive(Copy, Clone, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut stack: Vec<(usize, usize)> = vec![(OUTPUT_MODULE, 0)];
        marks[OUTPUT_MODULE] = Mark::OnStack;
        self.order.clear();

        while let Some(top) = stack.len().checked_sub(1) {
            let (node, next_input) = stack[top];
            let inputs = self.nodes[node]
                .as_ref()
                .map(|n| &n.inputs[..])
                .unwrap_or(&[]);

            match inputs.get(next_input) {
                Some(&dep) => {
                    stack[top].1 += 1;
                    let exists = matches!(self.nodes.get(dep), Some(Some(_)));
                    if exists && marks[dep] == Mark::Unvisited {
                        marks[dep] = Mark::OnStack;
                        stack.push((dep, 0));
                    }
                }
                None => {
                    marks[node] = Mark::Done;
                    self.order.push(node);
                    stack.pop();
                }
            }
        }
    }

    pub(crate) fn any_solo(&self) -> bool {
        self.iter().any(|(_, n)| n.flags.solo)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.order_dirty = true;
    }

    /// Start a block of `frames` frames: clear every module's output.
    pub(crate) fn begin_block(&mut self, frames: usize) {
        debug_assert!(frames <= MAX_BLOCK_FRAMES);
        self.block_frames = frames;
        for node in self.nodes.iter_mut().flatten() {
            for ch in node.out.iter_mut() {
                ch[..frames].fill(0.0);
            }
        }
    }

    /// Render frames `start..end` of the current block for every module in render order.
    pub(crate) fn render_chunk(
        &mut self,
        start: usize,
        end: usize,
        sample_rate: u32,
        external: Option<[&[f32]; 2]>,
    ) {
        debug_assert!(start <= end && end <= self.block_frames);
        if start == end {
            return;
        }

        let any_solo = self.any_solo();
        // The order can't change mid-render; take it so the arena can be borrowed mutably.
        self.render_order();
        let order = std::mem::take(&mut self.order);

        for &index in order.iter() {
            for ch in 0..2 {
                let sum = &mut self.input_sum[ch][start..end];
                sum.fill(0.0);
                let Some(Some(node)) = self.nodes.get(index) else {
                    continue;
                };
                for &src in node.inputs.iter() {
                    if let Some(Some(src)) = self.nodes.get(src) {
                        for (s, x) in sum.iter_mut().zip(src.out[ch][start..end].iter()) {
                            *s += *x;
                        }
                    }
                }
            }

            let Some(Some(node)) = self.nodes.get_mut(index) else {
                continue;
            };
            let ModuleNode {
                handler,
                controllers,
                out,
                flags,
                ..
            } = node;
            let kind = handler.kind();

            let silenced =
                flags.mute || (any_solo && !flags.solo && kind == ModuleKind::Generator);
            if silenced {
                continue;
            }

            let [in_l, in_r] = &self.input_sum;
            if flags.bypass && kind != ModuleKind::Output {
                out[0][start..end].copy_from_slice(&in_l[start..end]);
                out[1][start..end].copy_from_slice(&in_r[start..end]);
                continue;
            }

            let [out_l, out_r] = out;
            let external = external.map(|[l, r]| [&l[start..end], &r[start..end]]);
            handler.render(&mut RenderContext {
                sample_rate,
                controllers: &controllers[..],
                inputs: [&in_l[start..end], &in_r[start..end]],
                outputs: [&mut out_l[start..end], &mut out_r[start..end]],
                external,
            });
        }

        self.order = order;
    }

    /// Finish the block: record peak levels.
    pub(crate) fn end_block(&mut self) {
        let frames = self.block_frames;
        for node in self.nodes.iter_mut().flatten() {
            for (peak, ch) in node.peak.iter_mut().zip(node.out.iter()) {
                *peak = ch[..frames].iter().fold(0.0f32, |m, s| m.max(s.abs()));
            }
        }
    }

    pub(crate) fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// The slot's output for the current block.
    pub(crate) fn output(&self, channel: usize) -> &[f32] {
        match self.nodes.first() {
            Some(Some(out)) => out.output(channel, self.block_frames),
            _ => &[],
        }
    }

    pub(crate) fn output_peak(&self) -> [f32; 2] {
        match self.nodes.first() {
            Some(Some(out)) => out.peak,
            _ => [0.0; 2],
        }
    }

    pub(crate) fn note_on(&mut self, index: usize, voice: usize, note: u8, velocity: u8) {
        if let Ok(node) = self.get_mut(index) {
            let frequency = note_frequency(note, node.relative_note, node.finetune);
            node.send(&ModuleEvent::NoteOn {
                voice,
                note,
                velocity,
                frequency,
            });
        }
    }

    pub(crate) fn send(&mut self, index: usize, event: &ModuleEvent) {
        if let Ok(node) = self.get_mut(index) {
            node.send(event);
        }
    }

    pub(crate) fn broadcast(&mut self, event: &ModuleEvent) {
        for node in self.nodes.iter_mut().flatten() {
            node.send(event);
        }
    }

    /// Set a controller from the render path.  Unknown modules or controllers are ignored.
    pub(crate) fn set_controller(
        &mut self,
        index: usize,
        controller: usize,
        value: i32,
        scaling: CtlScaling,
    ) {
        if let Ok(node) = self.get_mut(index) {
            if let Some(c) = node.controllers.get_mut(controller) {
                c.set(value, scaling);
            }
        }
    }
}
