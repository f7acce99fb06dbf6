//! One independent synthesizer instance: module graph, pattern timeline, transport and the render loop tying them
//! together.
use arrayvec::ArrayVec;

use crate::config::{EVENT_QUEUE_CAPACITY, MAX_VOLUME, POSITION_HISTORY};
use crate::graph::ModuleGraph;
use crate::modules::ModuleEvent;
use crate::note::NoteEvent;
use crate::pattern::PatternTimeline;
use crate::router::{route, route_with_raw, TimedEvent};
use crate::time::{frames_for_ticks, LinePosition, Ticks};
use crate::transport::Transport;

#[derive(Copy, Clone, Debug)]
struct Snapshot {
    tick: Ticks,
    position: LinePosition,
    /// Peak output level per channel, 0..=255.
    level: [u8; 2],
}

/// What rendering a block produced besides audio.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct BlockReport {
    /// Frame offset of the first sync pulse raised in the block.
    pub(crate) sync_pulse: Option<usize>,
}

pub(crate) struct SlotEngine {
    pub(crate) graph: ModuleGraph,
    pub(crate) timeline: PatternTimeline,
    pub(crate) transport: Transport,
    pub(crate) volume: u16,
    pub(crate) name: String,
    sample_rate: u32,
    ticks_per_second: u32,
    /// Live events not yet due, ordered by tick.
    pending: Vec<TimedEvent>,
    history: ArrayVec<Snapshot, POSITION_HISTORY>,
    /// Cells collected for the line being triggered, reused across lines.
    cell_scratch: Vec<(usize, NoteEvent)>,
}

impl SlotEngine {
    pub(crate) fn new(sample_rate: u32, ticks_per_second: u32) -> Self {
        SlotEngine {
            graph: ModuleGraph::new(),
            timeline: PatternTimeline::new(),
            transport: Transport::new(),
            volume: MAX_VOLUME,
            name: String::new(),
            sample_rate,
            ticks_per_second,
            pending: Vec::with_capacity(EVENT_QUEUE_CAPACITY),
            history: ArrayVec::new(),
            cell_scratch: Vec::with_capacity(crate::config::MAX_PATTERN_TRACKS * 4),
        }
    }

    /// Queue a live event, keeping the queue ordered by tick.  Events with equal ticks keep arrival order.
    ///
    /// The queue never grows past [EVENT_QUEUE_CAPACITY]; events arriving when it is full are dropped and false is
    /// returned.
    pub(crate) fn queue(&mut self, event: TimedEvent) -> bool {
        if self.pending.len() >= EVENT_QUEUE_CAPACITY {
            rt_warn!("Dropping a live event for tick {}: too many pending events", event.tick.0);
            return false;
        }
        let at = self
            .pending
            .iter()
            .rposition(|e| !event.tick.is_before(e.tick))
            .map(|i| i + 1)
            .unwrap_or(0);
        self.pending.insert(at, event);
        true
    }

    /// Silence every module and drop queued events.
    pub(crate) fn reset_modules(&mut self) {
        self.pending.clear();
        self.graph.broadcast(&ModuleEvent::Reset);
    }

    fn offset_of(&self, tick: Ticks, block_tick: Ticks) -> usize {
        frames_for_ticks(tick.since(block_tick), self.sample_rate, self.ticks_per_second)
    }

    /// Render frames `start..frames` of a block.
    ///
    /// Live events are placed relative to `block_tick`, the tick the block's first frame corresponds to on the event
    /// clock; `heard_at` is when that frame reaches the listener.  Frames before `start` are silent; this is how a slot
    /// released by a sync pulse joins mid-block.  The result is read through [ModuleGraph::output].
    pub(crate) fn render(
        &mut self,
        start: usize,
        frames: usize,
        block_tick: Ticks,
        heard_at: Ticks,
        external: Option<[&[f32]; 2]>,
    ) -> BlockReport {
        let mut report = BlockReport::default();
        let position = self.transport.position(self.sample_rate);
        self.graph.begin_block(frames);

        let mut pos = start;
        let mut retriggers = 0;
        while pos < frames {
            // Late events play at the current position; early ones wait for theirs.
            while let Some(first) = self.pending.first().copied() {
                if self.offset_of(first.tick, block_tick) > pos {
                    break;
                }
                self.pending.remove(0);
                let outcome = route_with_raw(
                    &mut self.graph,
                    &mut self.transport,
                    first.voice,
                    &first.event,
                    first.raw_ctl_val,
                );
                if outcome.sync && report.sync_pulse.is_none() {
                    report.sync_pulse = Some(pos);
                }
            }

            if let Some(line) = self.transport.take_line_trigger() {
                if self.trigger_line(line) && report.sync_pulse.is_none() {
                    report.sync_pulse = Some(pos);
                }
            }

            let mut end = frames;
            if let Some(first) = self.pending.first() {
                end = end.min(self.offset_of(first.tick, block_tick));
            }
            if let Some(until_line) = self.transport.frames_until_line(self.sample_rate) {
                if until_line == 0 {
                    // The line's own cells stopped and restarted playback.  Fire it again, but only a few times.
                    retriggers += 1;
                    if retriggers < 4 {
                        continue;
                    }
                    self.transport.take_line_trigger();
                }
                end = end.min(pos + until_line);
            }
            let end = end.max(pos + 1).min(frames);

            self.graph
                .render_chunk(pos, end, self.sample_rate, external);
            self.transport.advance(end - pos, self.sample_rate);
            pos = end;
            retriggers = 0;
        }

        self.graph.end_block();
        self.record(heard_at, position);
        report
    }

    /// Apply the cells of song line `line`.  Returns whether one of them raised a sync pulse.
    fn trigger_line(&mut self, line: i32) -> bool {
        let length = self.timeline.length_lines();
        let mut line = line;
        if line >= length || line < 0 {
            if self.transport.autostop || length == 0 {
                self.transport.stop();
                return false;
            }
            line = 0;
            self.transport.rewind(0);
            self.transport.take_line_trigger();
        }

        let mut cells = std::mem::take(&mut self.cell_scratch);
        cells.clear();
        self.timeline
            .for_each_cell_on(line, |track, cell| cells.push((track, *cell)));

        let mut sync = false;
        for (track, cell) in cells.iter() {
            let outcome = route(&mut self.graph, &mut self.transport, *track, cell);
            sync |= outcome.sync;
        }

        self.cell_scratch = cells;
        sync
    }

    fn record(&mut self, tick: Ticks, position: LinePosition) {
        let peak = self.graph.output_peak();
        let level = peak.map(|p| (p.clamp(0.0, 1.0) * 255.0) as u8);
        if self.history.is_full() {
            self.history.remove(0);
        }
        self.history.push(Snapshot {
            tick,
            position,
            level,
        });
    }

    /// The newest snapshot at or before `now`, falling back to the oldest one.
    fn snapshot_at(&self, now: Ticks) -> Option<&Snapshot> {
        self.history
            .iter()
            .rev()
            .find(|s| !now.is_before(s.tick))
            .or_else(|| self.history.first())
    }

    /// The position audible at `now`.
    pub(crate) fn position_at(&self, now: Ticks) -> LinePosition {
        match self.snapshot_at(now) {
            Some(s) => s.position,
            None => self.transport.position(self.sample_rate),
        }
    }

    /// The output level audible at `now`, 0..=255.
    pub(crate) fn level_at(&self, now: Ticks, channel: usize) -> u8 {
        self.snapshot_at(now)
            .map(|s| s.level[channel.min(1)])
            .unwrap_or(0)
    }

    /// Song length in frames at the current tempo.
    pub(crate) fn length_frames(&self) -> u64 {
        let lines = self.timeline.length_lines().max(0) as f64;
        (lines * self.transport.frames_per_line(self.sample_rate)).round() as u64
    }
}
