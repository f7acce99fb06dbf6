use crate::config::{EngineConfigBuilderError, MAX_SLOTS};

#[derive(Debug, derive_more::Display, derive_more::IsVariant)]
pub(crate) enum ErrorPayload {
    #[display(fmt = "Slot {} is outside 0..{}", _0, MAX_SLOTS)]
    InvalidSlot(usize),

    #[display(fmt = "Slot {} is not open", _0)]
    SlotNotOpen(usize),

    #[display(fmt = "No module with index {}", _0)]
    NoSuchModule(usize),

    #[display(fmt = "Module {} is reserved and cannot be created, removed or replaced", _0)]
    ReservedModule(usize),

    #[display(fmt = "Module {} has no controller {}", module, controller)]
    NoSuchController { module: usize, controller: usize },

    #[display(fmt = "No pattern with index {}", _0)]
    NoSuchPattern(usize),

    #[display(fmt = "Track {} is out of range for a pattern with {} tracks", track, tracks)]
    TrackOutOfRange { track: usize, tracks: usize },

    #[display(fmt = "Line {} is out of range for a pattern with {} lines", line, lines)]
    LineOutOfRange { line: usize, lines: usize },

    #[display(fmt = "Invalid pattern size {}x{}", tracks, lines)]
    InvalidPatternSize { tracks: usize, lines: usize },

    #[display(fmt = "Unknown module type {}", _0)]
    UnknownModuleType(String),

    #[display(fmt = "Expected a {} module, found {}", expected, actual)]
    CapabilityMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[display(fmt = "Slot {} is not locked by this thread", _0)]
    LockNotHeld(usize),

    #[display(fmt = "Slot {} is locked by another thread", _0)]
    LockedElsewhere(usize),

    #[display(fmt = "Event queue of slot {} is full", _0)]
    EventQueueFull(usize),

    #[display(fmt = "All slots are in use")]
    SlotsExhausted,

    #[display(fmt = "Module limit reached")]
    ModuleLimit,

    #[display(fmt = "Sample slot {} is out of range", _0)]
    SampleSlotOutOfRange(usize),

    #[display(fmt = "Invalid buffer: {}", _0)]
    InvalidBuffer(&'static str),

    #[display(fmt = "Configuration error: {}", _0)]
    Config(String),

    #[display(fmt = "Configuration builder error: {}", _0)]
    ConfigBuilder(EngineConfigBuilderError),

    #[display(fmt = "Invalid project: {}", _0)]
    InvalidProject(String),

    #[display(fmt = "I/O error: {}", _0)]
    Io(std::io::Error),

    #[display(fmt = "Project decode error: {}", _0)]
    ProjectDecode(serde_json::Error),

    #[display(fmt = "Sample decode error: {}", _0)]
    SampleDecode(hound::Error),

    #[display(fmt = "Audio device error: {}", _0)]
    AudioDevice(Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, thiserror::Error)]
#[error("{payload}")]
pub struct Error {
    payload: ErrorPayload,
}

impl From<ErrorPayload> for Error {
    fn from(payload: ErrorPayload) -> Error {
        Error { payload }
    }
}

macro_rules! conv {
    ($variant: ident, $from_err: path) => {
        impl From<$from_err> for Error {
            fn from(value: $from_err) -> Error {
                Error {
                    payload: ErrorPayload::$variant(value),
                }
            }
        }
    };
}

conv!(Io, std::io::Error);
conv!(ProjectDecode, serde_json::Error);
conv!(SampleDecode, hound::Error);
conv!(ConfigBuilder, EngineConfigBuilderError);

#[cfg(feature = "device")]
impl From<crate::device::AudioDeviceError> for Error {
    fn from(value: crate::device::AudioDeviceError) -> Error {
        Error {
            payload: ErrorPayload::AudioDevice(Box::new(value)),
        }
    }
}

impl Error {
    /// The negative code the flat API reports for this error.
    ///
    /// Pattern cell access distinguishes `-2` (no such pattern), `-3` (track out of range) and `-4` (line out of
    /// range).  Everything else is `-1`.
    pub fn code(&self) -> i32 {
        match self.payload {
            ErrorPayload::NoSuchPattern(_) => -2,
            ErrorPayload::TrackOutOfRange { .. } => -3,
            ErrorPayload::LineOutOfRange { .. } => -4,
            _ => -1,
        }
    }

    /// Does this error name a slot, module, pattern, controller or cell that doesn't exist?
    pub fn is_invalid_handle(&self) -> bool {
        use ErrorPayload::*;
        matches!(
            self.payload,
            InvalidSlot(_)
                | SlotNotOpen(_)
                | NoSuchModule(_)
                | ReservedModule(_)
                | NoSuchController { .. }
                | NoSuchPattern(_)
                | TrackOutOfRange { .. }
                | LineOutOfRange { .. }
                | SampleSlotOutOfRange(_)
        )
    }

    pub fn is_slot_not_open(&self) -> bool {
        self.payload.is_slot_not_open()
    }

    pub fn is_no_such_pattern(&self) -> bool {
        self.payload.is_no_such_pattern()
    }

    pub fn is_track_out_of_range(&self) -> bool {
        self.payload.is_track_out_of_range()
    }

    pub fn is_line_out_of_range(&self) -> bool {
        self.payload.is_line_out_of_range()
    }

    pub fn is_unknown_module_type(&self) -> bool {
        self.payload.is_unknown_module_type()
    }

    /// Was an operation applied to a module of the wrong type, e.g. loading sample data into a generator?
    pub fn is_capability_mismatch(&self) -> bool {
        self.payload.is_capability_mismatch()
    }

    /// Was a slot unlocked that this thread doesn't hold, or closed while another thread holds it?
    pub fn is_lock_discipline(&self) -> bool {
        self.payload.is_lock_not_held() || self.payload.is_locked_elsewhere()
    }

    pub fn is_resource_exhaustion(&self) -> bool {
        use ErrorPayload::*;
        matches!(self.payload, SlotsExhausted | EventQueueFull(_) | ModuleLimit)
    }

    /// Did loading or decoding a project, module or sample fail?
    pub fn is_load_failure(&self) -> bool {
        use ErrorPayload::*;
        matches!(
            self.payload,
            Io(_) | ProjectDecode(_) | SampleDecode(_) | InvalidProject(_)
        )
    }

    pub fn is_config(&self) -> bool {
        self.payload.is_config() || self.payload.is_config_builder()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
