//! Logging that is safe to call while rendering.
//!
//! The render path must not allocate, take locks that a control thread may hold for long, or do I/O, and a `log`
//! backend may do all three.  The `rt_*` macros defined here behave like the `log` macros with one difference: on a
//! thread currently marked as rendering (see [crate::is_render_thread]), the message is formatted into a fixed-size
//! inline buffer and pushed into a bounded lock-free ring.  A background thread drains the ring and hands the messages
//! to `log`, noting when a message was cut short, when messages were dropped because the ring was full, and when
//! delivery lagged noticeably behind the render thread.
//!
//! Timestamps seen by the `log` backend are delivery times, not the time the render thread produced the message.  The
//! render thread unparks the drain thread after each push, so outside of overload the difference is small.
use std::cell::Cell;
use std::fmt::Arguments as FmtArgs;
use std::thread::{park, JoinHandle};
use std::time::{Duration, Instant};

use arrayvec::ArrayString;
use thingbuf::{recycling::Recycle, ThingBuf};

// Together these reserve roughly `MESSAGE_LIMIT * QUEUE_LENGTH` bytes.
const MESSAGE_LIMIT: usize = 256;
const QUEUE_LENGTH: usize = 4096;

/// Delivery latency above which the re-emitted message says how late it is.
const LATE_DELIVERY: Duration = Duration::from_millis(250);

type InlineText = ArrayString<MESSAGE_LIMIT>;

#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
enum Text {
    Static(&'static str),
    Inline(InlineText),
}

struct PendingRecord {
    /// Messages this thread failed to enqueue since its last successful push.
    dropped_before: u64,
    level: log::Level,
    target: &'static str,
    text: Text,
    truncated: bool,
    produced_at: Instant,
}

/// Writes into an [InlineText] until it is full, then silently discards the rest and remembers that it did.
struct TruncatingWriter<'a> {
    out: &'a mut InlineText,
    truncated: &'a mut bool,
}

impl std::fmt::Write for TruncatingWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        if *self.truncated {
            return Ok(());
        }

        if s.len() <= self.out.remaining_capacity() {
            self.out.push_str(s);
            return Ok(());
        }

        *self.truncated = true;
        // Capacity is in bytes; go by chars so we never split one.
        for c in s.chars() {
            if self.out.try_push(c).is_err() {
                break;
            }
        }

        Ok(())
    }
}

fn build_record(level: log::Level, args: FmtArgs<'_>, target: &'static str) -> PendingRecord {
    use std::fmt::Write;

    let mut truncated = false;
    let text = match args.as_str() {
        Some(s) => Text::Static(s),
        None => {
            let mut out = InlineText::new();
            let mut writer = TruncatingWriter {
                out: &mut out,
                truncated: &mut truncated,
            };
            // The writer never reports an error.
            let _ = write!(writer, "{}", args);
            Text::Inline(out)
        }
    };

    PendingRecord {
        dropped_before: 0,
        level,
        target,
        text,
        truncated,
        produced_at: Instant::now(),
    }
}

struct RecordRecycler;

impl Recycle<PendingRecord> for RecordRecycler {
    fn new_element(&self) -> PendingRecord {
        PendingRecord {
            dropped_before: 0,
            level: log::Level::Trace,
            target: module_path!(),
            text: Text::Static(""),
            truncated: false,
            produced_at: Instant::now(),
        }
    }

    fn recycle(&self, _element: &mut PendingRecord) {
        // Every field is overwritten on the next push.
    }
}

struct LogCtx {
    drain_thread: JoinHandle<()>,
    queue: ThingBuf<PendingRecord, RecordRecycler>,
}

lazy_static::lazy_static! {
    static ref GLOBAL_CTX: LogCtx = LogCtx {
        // The drain thread touches GLOBAL_CTX too, but only after this initializer has finished.
        drain_thread: std::thread::Builder::new()
            .name("voxslot-log".to_string())
            .spawn(drain_forever)
            .unwrap_or_else(|e| panic!("Unable to start the logging thread: {e}")),
        queue: ThingBuf::with_recycle(QUEUE_LENGTH, RecordRecycler),
    };
}

/// Entry point of the `rt_log!` macro on render threads.
pub(crate) fn dispatch_message(level: log::Level, args: FmtArgs<'_>, target: &'static str) {
    thread_local! {
        static DROPPED: Cell<u64> = const { Cell::new(0) };
    }

    if level > log::max_level() {
        return;
    }

    let mut record = build_record(level, args, target);
    record.dropped_before = DROPPED.get();

    if GLOBAL_CTX.queue.push(record).is_ok() {
        DROPPED.set(0);
        GLOBAL_CTX.drain_thread.thread().unpark();
    } else {
        DROPPED.set(DROPPED.get() + 1);
    }
}

fn emit(record: PendingRecord) {
    let text = match &record.text {
        Text::Static(s) => s,
        Text::Inline(s) => s.as_str(),
    };

    if record.dropped_before != 0 {
        log::warn!(
            "Render-thread log queue overflowed; {} messages were dropped",
            record.dropped_before
        );
    }

    let mut notes: smallvec::SmallVec<[u8; 64]> = smallvec::SmallVec::new();
    let latency = record.produced_at.elapsed();
    if latency > LATE_DELIVERY {
        use std::io::Write;
        // Writing into a SmallVec cannot fail.
        let _ = write!(notes, ", {:.3}s late", latency.as_secs_f64());
    }
    if record.truncated {
        notes.extend_from_slice(b", truncated");
    }
    let notes = std::str::from_utf8(&notes[..]).unwrap_or("");

    log::log!(target: record.target, record.level, "{} (render thread{notes})", text);
}

fn drain_forever() {
    loop {
        while let Some(record) = GLOBAL_CTX.queue.pop() {
            emit(record);
        }
        // A push between draining and parking leaves the unpark token set, so this returns immediately.
        park();
    }
}

/// Start the drain thread from a thread that isn't rendering.
pub(crate) fn ensure_log_ctx() {
    std::hint::black_box(GLOBAL_CTX.queue.capacity());
}

/// Like `log::log!`, but never blocks when called while rendering.  The target is always the calling module.
#[allow(clippy::crate_in_macro_def)]
macro_rules! rt_log {
    ($level: expr, $fmt: expr $(, $args: expr)* $(,)?) => {
        let macro_level = $level;
        if crate::is_render_thread::is_render_thread() {
            if macro_level <= log::max_level() {
                crate::logging::dispatch_message(macro_level, format_args!($fmt, $($args),*), module_path!());
            }
        } else {
            log::log!(macro_level, $fmt, $($args),*);
        }
    }
}

macro_rules! rt_error {
    ($($args: tt)+) => {
        rt_log!(log::Level::Error, $($args)*);
    }
}

macro_rules! rt_warn {
    ($($args: tt)+) => {
        rt_log!(log::Level::Warn, $($args)*);
    }
}

macro_rules! rt_info {
    ($($args: tt)+) => {
        rt_log!(log::Level::Info, $($args)*);
    }
}

macro_rules! rt_debug {
    ($($args: tt)+) => {
        rt_log!(log::Level::Debug, $($args)*);
    }
}

macro_rules! rt_trace {
    ($($args: tt)+) => {
        rt_log!(log::Level::Trace, $($args)*);
    }
}
