//! Time as seen by the control and render actors.
//!
//! Every edit, live event and rendered block is stamped with [Ticks] from one [TimeSource].  Ticks wrap, so they are
//! compared by wrapping difference and only have a meaningful order when less than half the range apart (about 35
//! minutes at the default rate).
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use crate::config::TICKS_PER_SECOND;

/// A point in time from a [TimeSource].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Ticks(pub u32);

impl Ticks {
    pub fn wrapping_add(self, ticks: u32) -> Ticks {
        Ticks(self.0.wrapping_add(ticks))
    }

    /// Signed distance from `earlier` to `self`.
    pub fn since(self, earlier: Ticks) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// Is this strictly before `other`?
    pub fn is_before(self, other: Ticks) -> bool {
        other.since(self) > 0
    }
}

pub trait TimeSource: Send + Sync + 'static {
    fn now(&self) -> Ticks;

    fn ticks_per_second(&self) -> u32 {
        TICKS_PER_SECOND
    }
}

/// Wall-clock ticks since construction.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> Ticks {
        let elapsed = self.origin.elapsed();
        let ticks = elapsed.as_nanos() * TICKS_PER_SECOND as u128 / 1_000_000_000;
        // Truncation is the wrap.
        Ticks(ticks as u32)
    }
}

/// A clock that only moves when told to.
///
/// Offline renderers advance it by each rendered block; tests use it to place events at exact sample offsets.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    pub fn new(start: Ticks) -> Self {
        ManualClock {
            now: AtomicU32::new(start.0),
        }
    }

    pub fn set(&self, now: Ticks) {
        self.now.store(now.0, Ordering::Release);
    }

    pub fn advance(&self, ticks: u32) -> Ticks {
        Ticks(self.now.fetch_add(ticks, Ordering::AcqRel).wrapping_add(ticks))
    }

    /// Advance by the duration of `frames` at `sample_rate`.
    pub fn advance_frames(&self, frames: usize, sample_rate: u32) -> Ticks {
        self.advance(ticks_for_frames(frames, sample_rate, TICKS_PER_SECOND))
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Ticks {
        Ticks(self.now.load(Ordering::Acquire))
    }
}

pub fn ticks_for_frames(frames: usize, sample_rate: u32, ticks_per_second: u32) -> u32 {
    (frames as u64 * ticks_per_second as u64 / sample_rate as u64) as u32
}

/// Whole frames covered by `ticks`, rounding down.  Negative durations are zero frames.
pub fn frames_for_ticks(ticks: i32, sample_rate: u32, ticks_per_second: u32) -> usize {
    if ticks <= 0 {
        return 0;
    }
    (ticks as u64 * sample_rate as u64 / ticks_per_second as u64) as usize
}

/// A playback position in lines as 27.5 fixed point: the integer line in the high bits, 1/32 line steps below.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LinePosition(i32);

impl LinePosition {
    pub const FRACTION_BITS: u32 = 5;

    /// `fraction` is the elapsed part of `line`, clamped to `0.0..1.0`.
    pub fn new(line: i32, fraction: f64) -> Self {
        let steps = (fraction.clamp(0.0, 1.0) * (1 << Self::FRACTION_BITS) as f64) as i32;
        let steps = steps.min((1 << Self::FRACTION_BITS) - 1);
        LinePosition((line << Self::FRACTION_BITS) | steps)
    }

    pub fn from_raw(raw: i32) -> Self {
        LinePosition(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn line(self) -> i32 {
        self.0 >> Self::FRACTION_BITS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn wrapping_order() {
        let late = Ticks(5);
        let early = Ticks(u32::MAX - 5);
        assert_eq!(late.since(early), 11);
        assert!(early.is_before(late));
        assert!(!late.is_before(early));
        assert!(!late.is_before(late));
    }

    #[test]
    fn manual_clock() {
        let clock = ManualClock::new(Ticks(10));
        assert_eq!(clock.advance(5), Ticks(15));
        assert_eq!(clock.now(), Ticks(15));
        // 512 frames at 50 kHz is exactly 10240 µs.
        assert_eq!(clock.advance_frames(512, 50_000), Ticks(10255));
    }

    #[test]
    fn line_position_parts() {
        let pos = LinePosition::new(3, 0.5);
        assert_eq!(pos.line(), 3);
        assert_eq!(pos.raw(), 3 * 32 + 16);
        assert_eq!(LinePosition::new(3, 1.0).line(), 3);
        assert_eq!(LinePosition::new(-1, 0.0).line(), -1);
    }

    proptest! {
        #[test]
        fn frame_conversion_never_overshoots(frames in 0usize..1_000_000, sr in 8000u32..192_000) {
            let ticks = ticks_for_frames(frames, sr, TICKS_PER_SECOND);
            let back = frames_for_ticks(ticks as i32, sr, TICKS_PER_SECOND);
            prop_assert!(back <= frames);
            prop_assert!(frames - back <= 1);
        }
    }
}
