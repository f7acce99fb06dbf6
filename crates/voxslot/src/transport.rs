use crate::config::{DEFAULT_BPM, DEFAULT_SPEED};
use crate::time::LinePosition;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, derive_more::IsVariant)]
pub enum TransportState {
    Stopped,
    Playing,
}

/// Playback state and cursor of one slot.
///
/// The cursor sits on `line`, `frame_in_line` frames into it.  A line's cells fire once, at the first frame of the
/// line; `line_pending` says that hasn't happened yet for the current line.
#[derive(Clone, Debug)]
pub(crate) struct Transport {
    state: TransportState,
    pub(crate) autostop: bool,
    bpm: u16,
    speed: u16,
    line: i32,
    frame_in_line: f64,
    line_pending: bool,
    /// Set by a jump effect; replaces `line + 1` at the next line boundary.
    jump: Option<i32>,
}

impl Transport {
    pub(crate) fn new() -> Self {
        Transport {
            state: TransportState::Stopped,
            autostop: true,
            bpm: DEFAULT_BPM,
            speed: DEFAULT_SPEED,
            line: 0,
            frame_in_line: 0.0,
            line_pending: false,
            jump: None,
        }
    }

    pub(crate) fn state(&self) -> TransportState {
        self.state
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub(crate) fn bpm(&self) -> u16 {
        self.bpm
    }

    pub(crate) fn speed(&self) -> u16 {
        self.speed
    }

    pub(crate) fn set_bpm(&mut self, bpm: u16) {
        self.bpm = bpm.clamp(1, 16000);
    }

    pub(crate) fn set_speed(&mut self, speed: u16) {
        self.speed = speed.clamp(1, 255);
    }

    pub(crate) fn line(&self) -> i32 {
        self.line
    }

    /// Frames per line: `speed` ticks of `60 / (bpm * 24)` seconds each.
    pub(crate) fn frames_per_line(&self, sample_rate: u32) -> f64 {
        sample_rate as f64 * 60.0 * self.speed as f64 / (self.bpm as f64 * 24.0)
    }

    pub(crate) fn position(&self, sample_rate: u32) -> LinePosition {
        let fpl = self.frames_per_line(sample_rate);
        LinePosition::new(self.line, self.frame_in_line / fpl)
    }

    /// Continue from the start of the current line.
    pub(crate) fn play(&mut self) {
        self.state = TransportState::Playing;
        self.frame_in_line = 0.0;
        self.line_pending = true;
        self.jump = None;
    }

    pub(crate) fn play_from_beginning(&mut self) {
        self.line = 0;
        self.play();
    }

    pub(crate) fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.line_pending = false;
        self.jump = None;
    }

    /// Move the cursor to the start of `line` without changing state.
    pub(crate) fn rewind(&mut self, line: i32) {
        self.line = line;
        self.frame_in_line = 0.0;
        self.line_pending = self.is_playing();
        self.jump = None;
    }

    pub(crate) fn jump_after_line(&mut self, line: i32) {
        self.jump = Some(line);
    }

    /// If playing and the current line hasn't fired yet, mark it fired and return it.
    pub(crate) fn take_line_trigger(&mut self) -> Option<i32> {
        if self.is_playing() && self.line_pending {
            self.line_pending = false;
            Some(self.line)
        } else {
            None
        }
    }

    /// Frames until the next line fires, or `None` when stopped.  Never `Some(0)` unless a trigger is pending.
    pub(crate) fn frames_until_line(&self, sample_rate: u32) -> Option<usize> {
        if !self.is_playing() {
            return None;
        }
        if self.line_pending {
            return Some(0);
        }
        let remaining = self.frames_per_line(sample_rate) - self.frame_in_line;
        Some((remaining.ceil() as usize).max(1))
    }

    pub(crate) fn advance(&mut self, frames: usize, sample_rate: u32) {
        if !self.is_playing() {
            return;
        }
        let fpl = self.frames_per_line(sample_rate);
        self.frame_in_line += frames as f64;
        // Chunks end at line boundaries, so at most one boundary is crossed; ceil() above can overshoot by < 1 frame.
        if self.frame_in_line + 1e-9 >= fpl {
            self.frame_in_line = (self.frame_in_line - fpl).max(0.0);
            self.line = self.jump.take().unwrap_or(self.line + 1);
            self.line_pending = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tempo() {
        let t = Transport::new();
        assert_eq!(t.frames_per_line(44100), 5292.0);
        assert!(t.state().is_stopped());
        assert!(t.autostop);
    }

    #[test]
    fn lines_fire_once_at_their_start() {
        let mut t = Transport::new();
        assert_eq!(t.take_line_trigger(), None);
        t.play_from_beginning();

        assert_eq!(t.frames_until_line(44100), Some(0));
        assert_eq!(t.take_line_trigger(), Some(0));
        assert_eq!(t.take_line_trigger(), None);
        assert_eq!(t.frames_until_line(44100), Some(5292));

        t.advance(5000, 44100);
        assert_eq!(t.frames_until_line(44100), Some(292));
        t.advance(292, 44100);
        assert_eq!(t.take_line_trigger(), Some(1));
        assert_eq!(t.position(44100).line(), 1);
    }

    #[test]
    fn rewind_keeps_state() {
        let mut t = Transport::new();
        t.rewind(7);
        assert!(t.state().is_stopped());
        assert_eq!(t.take_line_trigger(), None);
        assert_eq!(t.line(), 7);

        t.play();
        t.take_line_trigger();
        t.rewind(2);
        assert!(t.is_playing());
        assert_eq!(t.take_line_trigger(), Some(2));
    }

    #[test]
    fn jump_applies_at_boundary() {
        let mut t = Transport::new();
        t.set_speed(1);
        t.play_from_beginning();
        t.take_line_trigger();
        t.jump_after_line(10);
        assert_eq!(t.line(), 0);
        t.advance(882, 44100);
        assert_eq!(t.take_line_trigger(), Some(10));
    }
}
