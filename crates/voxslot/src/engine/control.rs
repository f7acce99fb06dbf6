use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam::queue::ArrayQueue;

use crate::config::EVENT_QUEUE_CAPACITY;
use crate::router::TimedEvent;
use crate::time::Ticks;

const PINNED_FLAG: u64 = 1 << 32;

/// Per-slot state shared between control threads and the renderer without taking the state mutex.
pub(crate) struct SlotControl {
    pub(crate) open: AtomicBool,
    pub(crate) lock_depth: AtomicUsize,
    /// Skipped by the dispatcher until resumed.
    pub(crate) suspended: AtomicBool,
    /// Resume on the next sync pulse from any slot.
    pub(crate) sync_armed: AtomicBool,
    /// Pinned event timestamp: `PINNED_FLAG | tick`, or 0.
    pinned: AtomicU64,
    pub(crate) events: ArrayQueue<TimedEvent>,
}

impl SlotControl {
    pub(crate) fn new() -> Self {
        SlotControl {
            open: AtomicBool::new(false),
            lock_depth: AtomicUsize::new(0),
            suspended: AtomicBool::new(false),
            sync_armed: AtomicBool::new(false),
            pinned: AtomicU64::new(0),
            events: ArrayQueue::new(EVENT_QUEUE_CAPACITY),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn pin(&self, tick: Option<Ticks>) {
        let raw = tick.map(|t| PINNED_FLAG | t.0 as u64).unwrap_or(0);
        self.pinned.store(raw, Ordering::Release);
    }

    pub(crate) fn pinned(&self) -> Option<Ticks> {
        let raw = self.pinned.load(Ordering::Acquire);
        (raw & PINNED_FLAG != 0).then(|| Ticks(raw as u32))
    }

    /// Back to the state of a freshly opened slot, minus `open`.
    pub(crate) fn reset(&self) {
        self.suspended.store(false, Ordering::Release);
        self.sync_armed.store(false, Ordering::Release);
        self.pin(None);
        while self.events.pop().is_some() {}
    }
}
