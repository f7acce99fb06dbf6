use std::cell::Cell;

thread_local! {
    static IS_RENDER_THREAD: Cell<bool> = const { Cell::new(false) };
}

pub(crate) fn is_render_thread() -> bool {
    IS_RENDER_THREAD.with(|x| x.get())
}

/// Marks the current thread as rendering until dropped.
///
/// Rendering may happen on a client thread that also does control work (one-thread mode, offline rendering), so the
/// mark is scoped rather than permanent.  Nesting restores the outer state.
pub(crate) struct RenderThreadMark {
    previous: bool,
}

impl RenderThreadMark {
    pub(crate) fn new() -> Self {
        let previous = IS_RENDER_THREAD.with(|x| x.replace(true));
        RenderThreadMark { previous }
    }
}

impl Drop for RenderThreadMark {
    fn drop(&mut self) {
        IS_RENDER_THREAD.with(|x| x.set(self.previous));
    }
}

/// Permanently mark this thread as a render thread, as device callback threads are.
#[cfg(feature = "device")]
pub(crate) fn mark_render_thread() {
    IS_RENDER_THREAD.with(|x| x.set(true));
}
