//! Patterns and the timeline that arranges them.
use crate::config::{MAX_PATTERNS, MAX_PATTERN_LINES, MAX_PATTERN_TRACKS};
use crate::error::{ErrorPayload, Result};
use crate::note::{EventPatch, NoteEvent};

fn check_size(tracks: usize, lines: usize) -> Result<()> {
    if (1..=MAX_PATTERN_TRACKS).contains(&tracks) && (1..=MAX_PATTERN_LINES).contains(&lines) {
        Ok(())
    } else {
        Err(ErrorPayload::InvalidPatternSize { tracks, lines }.into())
    }
}

/// A grid of note events, `tracks` wide and `lines` long, placed on the song timeline at line `x`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    tracks: usize,
    lines: usize,
    /// Line-major: cell `(track, line)` is at `line * tracks + track`.
    data: Vec<NoteEvent>,
    pub name: String,
    /// First song line this pattern plays on.
    pub x: i32,
    /// Arrangement lane.  Has no effect on timing.
    pub y: i32,
    pub muted: bool,
}

impl Pattern {
    pub fn new(tracks: usize, lines: usize, x: i32, y: i32, name: impl Into<String>) -> Result<Self> {
        check_size(tracks, lines)?;
        Ok(Pattern {
            tracks,
            lines,
            data: vec![NoteEvent::default(); tracks * lines],
            name: name.into(),
            x,
            y,
            muted: false,
        })
    }

    pub fn tracks(&self) -> usize {
        self.tracks
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn data(&self) -> &[NoteEvent] {
        &self.data
    }

    /// Overwrite cells in storage order with `events`, stopping at whichever ends first.
    ///
    /// Returns the number of cells written.
    pub fn copy_from(&mut self, events: &[NoteEvent]) -> usize {
        let n = events.len().min(self.data.len());
        self.data[..n].copy_from_slice(&events[..n]);
        n
    }

    fn index(&self, track: usize, line: usize) -> Result<usize> {
        // Track is checked first: callers rely on getting the track error for a bad track on any line.
        if track >= self.tracks {
            return Err(ErrorPayload::TrackOutOfRange {
                track,
                tracks: self.tracks,
            }
            .into());
        }
        if line >= self.lines {
            return Err(ErrorPayload::LineOutOfRange {
                line,
                lines: self.lines,
            }
            .into());
        }
        Ok(line * self.tracks + track)
    }

    pub fn cell(&self, track: usize, line: usize) -> Result<&NoteEvent> {
        let i = self.index(track, line)?;
        Ok(&self.data[i])
    }

    pub fn cell_mut(&mut self, track: usize, line: usize) -> Result<&mut NoteEvent> {
        let i = self.index(track, line)?;
        Ok(&mut self.data[i])
    }

    /// Change the grid size, keeping cells whose coordinates exist in both sizes.
    ///
    /// `None` keeps a dimension.  New cells are empty.
    pub fn resize(&mut self, tracks: Option<usize>, lines: Option<usize>) -> Result<()> {
        let tracks = tracks.unwrap_or(self.tracks);
        let lines = lines.unwrap_or(self.lines);
        check_size(tracks, lines)?;
        if tracks == self.tracks && lines == self.lines {
            return Ok(());
        }

        let mut data = vec![NoteEvent::default(); tracks * lines];
        let keep_tracks = tracks.min(self.tracks);
        for line in 0..lines.min(self.lines) {
            let src = line * self.tracks;
            let dst = line * tracks;
            data[dst..dst + keep_tracks].copy_from_slice(&self.data[src..src + keep_tracks]);
        }

        self.data = data;
        self.tracks = tracks;
        self.lines = lines;
        Ok(())
    }

    /// The pattern's own line for song line `line`, if it covers it.
    pub fn local_line(&self, line: i32) -> Option<usize> {
        let local = line as i64 - self.x as i64;
        (0..self.lines as i64).contains(&local).then_some(local as usize)
    }

    /// One past the last song line this pattern covers.
    pub fn end_line(&self) -> i32 {
        self.x.saturating_add(self.lines as i32)
    }
}

/// The patterns of one slot, by index.
///
/// Removed patterns leave a hole that the next new pattern fills, so indices of other patterns never move.
#[derive(Clone, Debug, Default)]
pub(crate) struct PatternTimeline {
    patterns: Vec<Option<Pattern>>,
}

impl PatternTimeline {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of indices, holes included.
    pub(crate) fn len(&self) -> usize {
        self.patterns.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &Pattern)> {
        self.patterns
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (i, p)))
    }

    pub(crate) fn get(&self, index: usize) -> Result<&Pattern> {
        self.patterns
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| ErrorPayload::NoSuchPattern(index).into())
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Result<&mut Pattern> {
        self.patterns
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or_else(|| ErrorPayload::NoSuchPattern(index).into())
    }

    pub(crate) fn insert(&mut self, pattern: Pattern) -> usize {
        match self.patterns.iter().position(Option::is_none) {
            Some(hole) => {
                self.patterns[hole] = Some(pattern);
                hole
            }
            None => {
                self.patterns.push(Some(pattern));
                self.patterns.len() - 1
            }
        }
    }

    pub(crate) fn insert_at(&mut self, index: usize, pattern: Pattern) -> Result<()> {
        if index >= MAX_PATTERNS {
            return Err(ErrorPayload::InvalidProject(format!(
                "pattern index {index} is over the limit of {MAX_PATTERNS}"
            ))
            .into());
        }
        if self.patterns.len() <= index {
            self.patterns.resize(index + 1, None);
        }
        if self.patterns[index].is_some() {
            return Err(ErrorPayload::InvalidProject(format!("pattern {index} defined twice")).into());
        }
        self.patterns[index] = Some(pattern);
        Ok(())
    }

    /// Copy pattern `source` to a new index, placed at `(x, y)`.
    pub(crate) fn clone_pattern(&mut self, source: usize, x: i32, y: i32) -> Result<usize> {
        let mut copy = self.get(source)?.clone();
        copy.x = x;
        copy.y = y;
        copy.muted = false;
        Ok(self.insert(copy))
    }

    pub(crate) fn remove(&mut self, index: usize) -> Result<Pattern> {
        let removed = self
            .patterns
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(ErrorPayload::NoSuchPattern(index))?;
        while matches!(self.patterns.last(), Some(None)) {
            self.patterns.pop();
        }
        Ok(removed)
    }

    pub(crate) fn find(&self, name: &str) -> Option<usize> {
        self.iter().find(|(_, p)| p.name == name).map(|(i, _)| i)
    }

    pub(crate) fn set_event(
        &mut self,
        index: usize,
        track: usize,
        line: usize,
        patch: &EventPatch,
    ) -> Result<()> {
        let cell = self.get_mut(index)?.cell_mut(track, line)?;
        patch.apply(cell);
        Ok(())
    }

    pub(crate) fn event(&self, index: usize, track: usize, line: usize) -> Result<NoteEvent> {
        Ok(*self.get(index)?.cell(track, line)?)
    }

    /// Returns the previous mute state.
    pub(crate) fn set_muted(&mut self, index: usize, muted: bool) -> Result<bool> {
        let p = self.get_mut(index)?;
        Ok(std::mem::replace(&mut p.muted, muted))
    }

    /// Song length in lines: the furthest end of any pattern, muted or not.
    pub(crate) fn length_lines(&self) -> i32 {
        self.iter().map(|(_, p)| p.end_line()).max().unwrap_or(0).max(0)
    }

    /// Call `f` for every non-empty cell of every unmuted pattern playing on song line `line`.
    pub(crate) fn for_each_cell_on(&self, line: i32, mut f: impl FnMut(usize, &NoteEvent)) {
        for (_, p) in self.iter().filter(|(_, p)| !p.muted) {
            let Some(local) = p.local_line(line) else {
                continue;
            };
            let row = &p.data[local * p.tracks..(local + 1) * p.tracks];
            for (track, cell) in row.iter().enumerate() {
                if !cell.is_empty() {
                    f(track, cell);
                }
            }
        }
    }
}
