//! The public engine: a fixed pool of slots, the lock discipline around them, and the render entry points.
//!
//! Two locks protect the slots.  The render gate is held by the renderer for a whole render call and by a control
//! thread between `lock_slot` and `unlock_slot`, so edits made under a lock are never observed half done.  The state
//! mutex guards the slot data itself and is taken briefly by every operation, always after the gate when both are
//! taken.  Live events bypass both through per-slot lock-free queues.
pub(crate) mod control;
mod module_ops;
mod pattern_ops;
mod project_ops;

pub use module_ops::ModuleInfo;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{EngineConfig, LIVE_VOICE_BASE, MAX_PATTERN_TRACKS, MAX_SLOTS, MAX_VOLUME};
use crate::dispatcher::{Dispatcher, InputBuffer, OutputBuffer, RenderTiming};
use crate::error::{ErrorPayload, Result};
use crate::is_render_thread::RenderThreadMark;
use crate::modules::ModuleRegistry;
use crate::note::NoteEvent;
use crate::render_gate::RenderGate;
use crate::router::TimedEvent;
use crate::slot::SlotEngine;
use crate::time::{LinePosition, MonotonicClock, Ticks, TimeSource};
use crate::transport::TransportState;

use control::SlotControl;

pub(crate) struct EngineState {
    pub(crate) slots: [Option<Box<SlotEngine>>; MAX_SLOTS],
    dispatcher: Dispatcher,
}

struct EngineInner {
    config: EngineConfig,
    clock: Arc<dyn TimeSource>,
    registry: ModuleRegistry,
    gate: RenderGate,
    state: Mutex<EngineState>,
    controls: [SlotControl; MAX_SLOTS],
}

/// A handle to the engine.  Clones share the same slots.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

/// Holds a slot's lock until dropped.  See [Engine::lock].
pub struct SlotLock<'a> {
    engine: &'a Engine,
    slot: usize,
}

impl Drop for SlotLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.engine.unlock_slot(self.slot) {
            rt_error!("Releasing the lock on slot {}: {}", self.slot, e);
        }
    }
}

impl SlotLock<'_> {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// The engine version as `major << 16 | minor << 8 | patch`.
pub fn version() -> u32 {
    let part = |s: &str| s.parse::<u32>().unwrap_or(0) & 0xff;
    part(env!("CARGO_PKG_VERSION_MAJOR")) << 16
        | part(env!("CARGO_PKG_VERSION_MINOR")) << 8
        | part(env!("CARGO_PKG_VERSION_PATCH"))
}

impl Engine {
    /// Create an engine with the built-in module types and the monotonic clock.
    pub fn new(config: EngineConfig) -> Result<Engine> {
        Self::with_parts(
            config,
            ModuleRegistry::with_builtins(),
            Arc::new(MonotonicClock::new()),
        )
    }

    /// Create an engine with a custom module registry and time source.
    pub fn with_parts(
        config: EngineConfig,
        registry: ModuleRegistry,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Engine> {
        config.validate()?;
        crate::logging::ensure_log_ctx();

        for (k, v) in config.extra_options.iter() {
            if config.debug_output {
                log::debug!("Ignoring engine option {k}={v}");
            }
        }
        log::info!(
            "Engine {:#x} at {} Hz, {} channel(s), {:?}",
            version(),
            config.sample_rate,
            config.channels,
            config.sample_format
        );

        Ok(Engine {
            inner: Arc::new(EngineInner {
                config,
                clock,
                registry,
                gate: RenderGate::new(),
                state: Mutex::new(EngineState {
                    slots: std::array::from_fn(|_| None),
                    dispatcher: Dispatcher::new(),
                }),
                controls: std::array::from_fn(|_| SlotControl::new()),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.inner.registry
    }

    /// The current time on the engine's clock.
    pub fn ticks(&self) -> Ticks {
        self.inner.clock.now()
    }

    pub fn ticks_per_second(&self) -> u32 {
        self.inner.clock.ticks_per_second()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        // Every critical section leaves the slots consistent, so a panic elsewhere doesn't invalidate them.
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn control(&self, slot: usize) -> Result<&SlotControl> {
        self.inner
            .controls
            .get(slot)
            .ok_or_else(|| ErrorPayload::InvalidSlot(slot).into())
    }

    /// Run `f` against an open slot.
    pub(crate) fn with_slot<T>(&self, slot: usize, f: impl FnOnce(&SlotEngine) -> Result<T>) -> Result<T> {
        self.control(slot)?;
        let state = self.state();
        let s = state.slots[slot]
            .as_deref()
            .ok_or(ErrorPayload::SlotNotOpen(slot))?;
        f(s)
    }

    pub(crate) fn with_slot_mut<T>(
        &self,
        slot: usize,
        f: impl FnOnce(&mut SlotEngine) -> Result<T>,
    ) -> Result<T> {
        self.control(slot)?;
        let mut state = self.state();
        let s = state.slots[slot]
            .as_deref_mut()
            .ok_or(ErrorPayload::SlotNotOpen(slot))?;
        f(s)
    }

    /// [Self::with_slot_mut] for operations that should run under [Self::lock_slot].
    pub(crate) fn with_locked_slot<T>(
        &self,
        slot: usize,
        operation: &str,
        f: impl FnOnce(&mut SlotEngine) -> Result<T>,
    ) -> Result<T> {
        self.check_locked(slot, operation);
        self.with_slot_mut(slot, f)
    }

    /// Warn when `operation` is made on `slot` without holding its lock.  The operation still proceeds.
    fn check_locked(&self, slot: usize, operation: &str) {
        let config = &self.inner.config;
        if !config.lock_checks || config.one_thread || !config.debug_output {
            return;
        }
        let Some(control) = self.inner.controls.get(slot) else {
            return;
        };
        let held = control.lock_depth.load(Ordering::Acquire) > 0
            && self.inner.gate.is_held_by_current_thread();
        if !held {
            rt_warn!("{} on slot {} without lock_slot", operation, slot);
        }
    }

    pub(crate) fn debug_output(&self) -> bool {
        self.inner.config.debug_output
    }

    /// Open `slot`, replacing whatever it held with an empty project.
    pub fn open_slot(&self, slot: usize) -> Result<()> {
        let control = self.control(slot)?;
        let fresh = Box::new(SlotEngine::new(
            self.inner.config.sample_rate,
            self.ticks_per_second(),
        ));
        let old = {
            let mut state = self.state();
            control.reset();
            control.open.store(true, Ordering::Release);
            state.slots[slot].replace(fresh)
        };
        if old.is_some() {
            log::debug!("Reopened slot {slot}");
        } else {
            log::debug!("Opened slot {slot}");
        }
        Ok(())
    }

    /// Open the lowest numbered closed slot and return it.
    pub fn open_any_slot(&self) -> Result<usize> {
        let mut state = self.state();
        let slot = state
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(ErrorPayload::SlotsExhausted)?;
        state.slots[slot] = Some(Box::new(SlotEngine::new(
            self.inner.config.sample_rate,
            self.ticks_per_second(),
        )));
        let control = &self.inner.controls[slot];
        control.reset();
        control.open.store(true, Ordering::Release);
        drop(state);
        log::debug!("Opened slot {slot}");
        Ok(slot)
    }

    /// Close `slot`, freeing everything it owns.
    ///
    /// If the calling thread holds the slot's lock, the lock is released.  Closing a slot another thread has locked is
    /// an error and leaves the slot open.
    pub fn close_slot(&self, slot: usize) -> Result<()> {
        let control = self.control(slot)?;
        if !self.inner.config.one_thread
            && control.lock_depth.load(Ordering::Acquire) > 0
            && !self.inner.gate.is_held_by_current_thread()
        {
            return Err(ErrorPayload::LockedElsewhere(slot).into());
        }
        let old = {
            let mut state = self.state();
            let old = state.slots[slot]
                .take()
                .ok_or(ErrorPayload::SlotNotOpen(slot))?;
            control.open.store(false, Ordering::Release);
            control.reset();
            old
        };
        // Freed outside the state mutex.
        drop(old);

        let depth = control.lock_depth.swap(0, Ordering::AcqRel);
        if !self.inner.config.one_thread {
            for _ in 0..depth {
                if !self.inner.gate.release() {
                    rt_warn!("Slot {} lost its lock while closing", slot);
                    break;
                }
            }
        }
        log::debug!("Closed slot {slot}");
        Ok(())
    }

    pub fn is_slot_open(&self, slot: usize) -> bool {
        self.inner
            .controls
            .get(slot)
            .map(SlotControl::is_open)
            .unwrap_or(false)
    }

    /// Exclude the renderer until the matching [Self::unlock_slot].
    ///
    /// Locks nest: each call must be balanced by one unlock from the same thread.  In one-thread mode only the depth is
    /// tracked.
    pub fn lock_slot(&self, slot: usize) -> Result<()> {
        let control = self.control(slot)?;
        if !control.is_open() {
            return Err(ErrorPayload::SlotNotOpen(slot).into());
        }
        if !self.inner.config.one_thread {
            self.inner.gate.acquire();
        }
        control.lock_depth.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn unlock_slot(&self, slot: usize) -> Result<()> {
        let control = self.control(slot)?;
        if control.lock_depth.load(Ordering::Acquire) == 0 {
            return Err(ErrorPayload::LockNotHeld(slot).into());
        }
        if !self.inner.config.one_thread && !self.inner.gate.release() {
            return Err(ErrorPayload::LockNotHeld(slot).into());
        }
        control.lock_depth.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    /// [Self::lock_slot], unlocking when the guard drops.
    pub fn lock(&self, slot: usize) -> Result<SlotLock<'_>> {
        self.lock_slot(slot)?;
        Ok(SlotLock { engine: self, slot })
    }

    /// Start playing from the current line.
    pub fn play(&self, slot: usize) -> Result<()> {
        self.with_slot_mut(slot, |s| {
            s.transport.play();
            Ok(())
        })
    }

    pub fn play_from_beginning(&self, slot: usize) -> Result<()> {
        self.with_slot_mut(slot, |s| {
            s.transport.play_from_beginning();
            Ok(())
        })
    }

    /// Stop playback.  Stopping a stopped slot silences all of its modules.
    pub fn stop(&self, slot: usize) -> Result<()> {
        self.with_slot_mut(slot, |s| {
            if s.transport.is_playing() {
                s.transport.stop();
            } else {
                s.reset_modules();
            }
            Ok(())
        })
    }

    /// Stop rendering the slot altogether, freezing its state.
    pub fn pause(&self, slot: usize) -> Result<()> {
        self.open_control(slot)?
            .suspended
            .store(true, Ordering::Release);
        Ok(())
    }

    pub fn resume(&self, slot: usize) -> Result<()> {
        let control = self.open_control(slot)?;
        control.sync_armed.store(false, Ordering::Release);
        control.suspended.store(false, Ordering::Release);
        Ok(())
    }

    /// Resume the slot at the next sync pulse raised by any slot.
    pub fn sync_resume(&self, slot: usize) -> Result<()> {
        self.open_control(slot)?
            .sync_armed
            .store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_suspended(&self, slot: usize) -> Result<bool> {
        Ok(self.open_control(slot)?.suspended.load(Ordering::Acquire))
    }

    fn open_control(&self, slot: usize) -> Result<&SlotControl> {
        let control = self.control(slot)?;
        if !control.is_open() {
            return Err(ErrorPayload::SlotNotOpen(slot).into());
        }
        Ok(control)
    }

    pub fn transport_state(&self, slot: usize) -> Result<TransportState> {
        self.with_slot(slot, |s| Ok(s.transport.state()))
    }

    /// True once playback has stopped, whether by autostop, a stop event or [Self::stop].
    pub fn end_of_song(&self, slot: usize) -> Result<bool> {
        self.with_slot(slot, |s| Ok(!s.transport.is_playing()))
    }

    /// Move the play cursor to `line`.
    pub fn rewind(&self, slot: usize, line: i32) -> Result<()> {
        self.with_slot_mut(slot, |s| {
            s.transport.rewind(line);
            Ok(())
        })
    }

    pub fn autostop(&self, slot: usize) -> Result<bool> {
        self.with_slot(slot, |s| Ok(s.transport.autostop))
    }

    /// With autostop off, the song loops at its end instead of stopping.
    pub fn set_autostop(&self, slot: usize, autostop: bool) -> Result<()> {
        self.with_slot_mut(slot, |s| {
            s.transport.autostop = autostop;
            Ok(())
        })
    }

    pub fn volume(&self, slot: usize) -> Result<u16> {
        self.with_slot(slot, |s| Ok(s.volume))
    }

    /// Set the slot volume (256 is unity gain).  Returns the previous volume.
    pub fn set_volume(&self, slot: usize, volume: u16) -> Result<u16> {
        self.with_slot_mut(slot, |s| {
            Ok(std::mem::replace(&mut s.volume, volume.min(MAX_VOLUME)))
        })
    }

    pub fn song_name(&self, slot: usize) -> Result<String> {
        self.with_slot(slot, |s| Ok(s.name.clone()))
    }

    pub fn set_song_name(&self, slot: usize, name: &str) -> Result<()> {
        self.with_slot_mut(slot, |s| {
            s.name = name.to_string();
            Ok(())
        })
    }

    pub fn song_bpm(&self, slot: usize) -> Result<u16> {
        self.with_slot(slot, |s| Ok(s.transport.bpm()))
    }

    pub fn set_song_bpm(&self, slot: usize, bpm: u16) -> Result<()> {
        self.with_slot_mut(slot, |s| {
            s.transport.set_bpm(bpm);
            Ok(())
        })
    }

    /// Ticks per line.
    pub fn song_speed(&self, slot: usize) -> Result<u16> {
        self.with_slot(slot, |s| Ok(s.transport.speed()))
    }

    pub fn set_song_speed(&self, slot: usize, speed: u16) -> Result<()> {
        self.with_slot_mut(slot, |s| {
            s.transport.set_speed(speed);
            Ok(())
        })
    }

    pub fn song_length_lines(&self, slot: usize) -> Result<i32> {
        self.with_slot(slot, |s| Ok(s.timeline.length_lines()))
    }

    /// Song length at the current tempo.  Tempo effects inside the song are not accounted for.
    pub fn song_length_frames(&self, slot: usize) -> Result<u64> {
        self.with_slot(slot, |s| Ok(s.length_frames()))
    }

    /// The line being heard now.
    pub fn current_line(&self, slot: usize) -> Result<i32> {
        Ok(self.current_line_fixed(slot)?.line())
    }

    pub fn current_line_fixed(&self, slot: usize) -> Result<LinePosition> {
        let now = self.ticks();
        self.with_slot(slot, |s| Ok(s.position_at(now)))
    }

    /// Peak level being heard now on `channel`, 0..=255.
    pub fn current_signal_level(&self, slot: usize, channel: usize) -> Result<u8> {
        let now = self.ticks();
        self.with_slot(slot, |s| Ok(s.level_at(now, channel)))
    }

    /// Queue a live event for `track` of `slot`.
    ///
    /// The event is stamped with the pinned timestamp if one is set, otherwise with the current time, and applied when
    /// rendering reaches that time.  Live events play on their own voices, separate from pattern tracks.
    pub fn send_event(&self, slot: usize, track: usize, event: NoteEvent) -> Result<()> {
        self.push_event(slot, track, event, None)
    }

    pub(crate) fn push_event(
        &self,
        slot: usize,
        track: usize,
        event: NoteEvent,
        raw_ctl_val: Option<i32>,
    ) -> Result<()> {
        let control = self.open_control(slot)?;
        let tick = control.pinned().unwrap_or_else(|| self.ticks());
        control
            .events
            .push(TimedEvent {
                tick,
                voice: LIVE_VOICE_BASE + track % MAX_PATTERN_TRACKS,
                event,
                raw_ctl_val,
            })
            .map_err(|_| ErrorPayload::EventQueueFull(slot))?;
        Ok(())
    }

    /// Stamp subsequent events of `slot` with `tick` instead of the current time, until cleared with `None`.
    pub fn set_event_timestamp(&self, slot: usize, tick: Option<Ticks>) -> Result<()> {
        self.open_control(slot)?.pin(tick);
        Ok(())
    }

    /// Render all running slots into `output`.
    ///
    /// `output` is interleaved with the configured channel count and sample format.  `out_time` is when its first
    /// frame will be heard and `latency` how many frames ahead of that it is being computed.  Returns whether any
    /// nonzero sample was written.
    pub fn render(&self, output: OutputBuffer<'_>, latency: u32, out_time: Ticks) -> Result<bool> {
        self.render_impl(output, None, latency, out_time)
    }

    /// [Self::render] with an external input block, fed to `Input` modules.
    pub fn render_filter(
        &self,
        output: OutputBuffer<'_>,
        input: InputBuffer<'_>,
        input_channels: usize,
        latency: u32,
        out_time: Ticks,
    ) -> Result<bool> {
        self.render_impl(output, Some((input, input_channels)), latency, out_time)
    }

    fn render_impl(
        &self,
        output: OutputBuffer<'_>,
        input: Option<(InputBuffer<'_>, usize)>,
        latency: u32,
        out_time: Ticks,
    ) -> Result<bool> {
        let config = &self.inner.config;
        if output.format() != config.sample_format {
            return Err(ErrorPayload::InvalidBuffer("sample format differs from the engine's").into());
        }

        let _mark = RenderThreadMark::new();
        let _gate = (!config.one_thread).then(|| self.inner.gate.enter());
        let mut state = self.state();
        let EngineState { slots, dispatcher } = &mut *state;
        dispatcher.render(
            slots,
            &self.inner.controls,
            RenderTiming {
                sample_rate: config.sample_rate,
                ticks_per_second: self.ticks_per_second(),
                out_time,
                latency,
            },
            config.channels,
            output,
            input,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn version_is_packed() {
        assert_eq!(version() >> 16, env!("CARGO_PKG_VERSION_MAJOR").parse::<u32>().unwrap());
    }

    #[test]
    fn slot_handles_are_checked() {
        let e = engine();
        assert!(e.open_slot(MAX_SLOTS).unwrap_err().is_invalid_handle());
        assert!(e.play(0).unwrap_err().is_slot_not_open());
        assert!(e.close_slot(0).unwrap_err().is_slot_not_open());
        e.open_slot(0).unwrap();
        assert!(e.is_slot_open(0));
        e.close_slot(0).unwrap();
        assert!(!e.is_slot_open(0));
    }

    #[test]
    fn open_any_takes_the_lowest_free_slot() {
        let e = engine();
        e.open_slot(0).unwrap();
        e.open_slot(2).unwrap();
        assert_eq!(e.open_any_slot().unwrap(), 1);
        assert_eq!(e.open_any_slot().unwrap(), 3);
        for _ in 4..MAX_SLOTS {
            e.open_any_slot().unwrap();
        }
        assert!(e.open_any_slot().unwrap_err().is_resource_exhaustion());
    }

    #[test]
    fn unbalanced_unlock_is_an_error() {
        let e = engine();
        e.open_slot(0).unwrap();
        assert!(e.unlock_slot(0).unwrap_err().is_lock_discipline());
        {
            let _a = e.lock(0).unwrap();
            let _b = e.lock(0).unwrap();
        }
        assert!(e.unlock_slot(0).unwrap_err().is_lock_discipline());
    }

    #[test]
    fn closing_releases_held_locks() {
        let e = engine();
        e.open_slot(0).unwrap();
        e.lock_slot(0).unwrap();
        e.lock_slot(0).unwrap();
        e.close_slot(0).unwrap();
        assert!(!e.inner.gate.is_held_by_current_thread());
    }

    #[test]
    fn wrong_sample_format_is_rejected() {
        let e = engine();
        let mut out = vec![0i16; 64];
        assert!(e
            .render(OutputBuffer::I16(&mut out), 0, Ticks(0))
            .is_err());
    }
}
