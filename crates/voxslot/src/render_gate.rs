//! The engine-wide render gate.
//!
//! A reentrant lock owned by one thread at a time.  The renderer holds it for a whole render call; `lock_slot` holds it
//! until the matching `unlock_slot`.  Unlike a `MutexGuard` it isn't tied to a scope, since the lock/unlock pair is
//! driven by separate API calls.
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::ThreadId;

#[derive(Debug, Default)]
struct GateState {
    owner: Option<ThreadId>,
    depth: usize,
}

#[derive(Debug, Default)]
pub(crate) struct RenderGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl RenderGate {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        // Nothing the gate does can panic while holding its mutex.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the current thread owns the gate, then deepen its hold by one.
    pub(crate) fn acquire(&self) {
        let me = std::thread::current().id();
        let mut state = self.state();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => {
                    state = self
                        .released
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    /// Drop one level of the current thread's hold.  Returns false if this thread doesn't hold the gate.
    pub(crate) fn release(&self) -> bool {
        let me = std::thread::current().id();
        let mut state = self.state();
        if state.owner != Some(me) {
            return false;
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
        true
    }

    pub(crate) fn is_held_by_current_thread(&self) -> bool {
        self.state().owner == Some(std::thread::current().id())
    }

    /// Acquire for the lifetime of the returned guard.
    pub(crate) fn enter(&self) -> GateGuard<'_> {
        self.acquire();
        GateGuard { gate: self }
    }
}

pub(crate) struct GateGuard<'a> {
    gate: &'a RenderGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn reentrant_for_the_owner() {
        let gate = RenderGate::new();
        gate.acquire();
        gate.acquire();
        assert!(gate.is_held_by_current_thread());
        assert!(gate.release());
        assert!(gate.is_held_by_current_thread());
        assert!(gate.release());
        assert!(!gate.is_held_by_current_thread());
        assert!(!gate.release());
    }

    #[test]
    fn other_threads_wait() {
        let gate = Arc::new(RenderGate::new());
        let (tx, rx) = crossbeam::channel::bounded(1);

        gate.acquire();
        let g2 = gate.clone();
        let handle = std::thread::spawn(move || {
            let _guard = g2.enter();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        gate.release();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert!(!gate.is_held_by_current_thread());
    }
}
