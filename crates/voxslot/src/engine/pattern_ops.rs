//! Pattern timeline operations on [Engine].
use super::Engine;
use crate::error::Result;
use crate::note::{EventField, EventPatch, NoteEvent};
use crate::pattern::Pattern;

impl Engine {
    /// Create a pattern at song line `x`, lane `y`.
    ///
    /// With `clone_from`, size and cells are copied from that pattern and `tracks`/`lines` are ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn new_pattern(
        &self,
        slot: usize,
        clone_from: Option<usize>,
        x: i32,
        y: i32,
        tracks: usize,
        lines: usize,
        name: &str,
    ) -> Result<usize> {
        match clone_from {
            Some(source) => self.with_locked_slot(slot, "new_pattern", |s| {
                let index = s.timeline.clone_pattern(source, x, y)?;
                s.timeline.get_mut(index)?.name = name.to_string();
                Ok(index)
            }),
            None => {
                // Allocated before taking the slot.
                let pattern = Pattern::new(tracks, lines, x, y, name)?;
                self.with_locked_slot(slot, "new_pattern", |s| Ok(s.timeline.insert(pattern)))
            }
        }
    }

    /// Remove a pattern.  Its index is reused by the next new pattern; other indices don't change.
    pub fn remove_pattern(&self, slot: usize, pattern: usize) -> Result<()> {
        let removed = self.with_locked_slot(slot, "remove_pattern", |s| s.timeline.remove(pattern))?;
        drop(removed);
        Ok(())
    }

    /// Change a pattern's size, keeping overlapping cells.  `None` keeps that dimension.
    pub fn resize_pattern(
        &self,
        slot: usize,
        pattern: usize,
        tracks: Option<usize>,
        lines: Option<usize>,
    ) -> Result<()> {
        self.with_locked_slot(slot, "resize_pattern", |s| {
            s.timeline.get_mut(pattern)?.resize(tracks, lines)
        })
    }

    /// Write the fields of `patch` that are set into one cell.
    ///
    /// Fails with [crate::Error::code] `-2` for a missing pattern, `-3` for a bad track and `-4` for a bad line.
    pub fn set_pattern_event(
        &self,
        slot: usize,
        pattern: usize,
        track: usize,
        line: usize,
        patch: EventPatch,
    ) -> Result<()> {
        self.with_locked_slot(slot, "set_pattern_event", |s| {
            s.timeline.set_event(pattern, track, line, &patch)
        })
    }

    /// One field of one cell, with the same errors as [Engine::set_pattern_event].
    pub fn pattern_event(
        &self,
        slot: usize,
        pattern: usize,
        track: usize,
        line: usize,
        field: EventField,
    ) -> Result<u16> {
        Ok(self.pattern_cell(slot, pattern, track, line)?.field(field))
    }

    pub fn pattern_cell(&self, slot: usize, pattern: usize, track: usize, line: usize) -> Result<NoteEvent> {
        self.with_slot(slot, |s| s.timeline.event(pattern, track, line))
    }

    /// The first pattern named exactly `name`.
    pub fn find_pattern(&self, slot: usize, name: &str) -> Result<Option<usize>> {
        self.with_slot(slot, |s| Ok(s.timeline.find(name)))
    }

    /// Mute or unmute a pattern.  Returns whether it was muted before.
    pub fn mute_pattern(&self, slot: usize, pattern: usize, mute: bool) -> Result<bool> {
        self.with_locked_slot(slot, "mute_pattern", |s| s.timeline.set_muted(pattern, mute))
    }

    /// Size of the pattern index space, holes included.
    pub fn number_of_patterns(&self, slot: usize) -> Result<usize> {
        self.with_slot(slot, |s| Ok(s.timeline.len()))
    }

    /// `(x, y)`: first song line and lane.
    pub fn pattern_position(&self, slot: usize, pattern: usize) -> Result<(i32, i32)> {
        self.with_slot(slot, |s| {
            let p = s.timeline.get(pattern)?;
            Ok((p.x, p.y))
        })
    }

    pub fn set_pattern_position(&self, slot: usize, pattern: usize, x: i32, y: i32) -> Result<()> {
        self.with_locked_slot(slot, "set_pattern_position", |s| {
            let p = s.timeline.get_mut(pattern)?;
            p.x = x;
            p.y = y;
            Ok(())
        })
    }

    /// `(tracks, lines)`.
    pub fn pattern_size(&self, slot: usize, pattern: usize) -> Result<(usize, usize)> {
        self.with_slot(slot, |s| {
            let p = s.timeline.get(pattern)?;
            Ok((p.tracks(), p.lines()))
        })
    }

    pub fn pattern_name(&self, slot: usize, pattern: usize) -> Result<String> {
        self.with_slot(slot, |s| Ok(s.timeline.get(pattern)?.name.clone()))
    }

    pub fn set_pattern_name(&self, slot: usize, pattern: usize, name: &str) -> Result<()> {
        self.with_locked_slot(slot, "set_pattern_name", |s| {
            s.timeline.get_mut(pattern)?.name = name.to_string();
            Ok(())
        })
    }

    /// A copy of every cell, line by line.
    pub fn pattern_data(&self, slot: usize, pattern: usize) -> Result<Vec<NoteEvent>> {
        self.with_slot(slot, |s| Ok(s.timeline.get(pattern)?.data().to_vec()))
    }

    /// Overwrite cells line by line from `events`.  Returns how many cells were written.
    pub fn set_pattern_data(&self, slot: usize, pattern: usize, events: &[NoteEvent]) -> Result<usize> {
        self.with_locked_slot(slot, "set_pattern_data", |s| {
            Ok(s.timeline.get_mut(pattern)?.copy_from(events))
        })
    }
}
