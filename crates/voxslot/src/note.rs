//! Note events: the cell type of patterns and the payload of live events.
use serde::{Deserialize, Serialize};

/// Notes at or above this value are commands rather than pitches.
pub const FIRST_NOTE_COMMAND: u8 = 128;

/// The velocity a note plays at when its velocity field is left at 0.
pub const DEFAULT_VELOCITY: u8 = 129;

/// The note that plays at exactly 440 Hz (A4, with C0 as note 1).
pub const A4_NOTE: u8 = 58;

/// Effect codes, the low byte of [NoteEvent::ctl].
pub mod effect {
    /// Set ticks per line to `XXYY`.
    pub const SET_SPEED: u8 = 0x0F;
    /// Set beats per minute to `XXYY`.
    pub const SET_BPM: u8 = 0x1F;
    /// Stop playback at this line.  Also raises a sync pulse.
    pub const STOP_PLAYING: u8 = 0x30;
    /// Continue from line `XXYY` once the current line ends.
    pub const JUMP_TO_LINE: u8 = 0x31;
    /// Raise a sync pulse without stopping.
    pub const SYNC: u8 = 0x33;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, derive_more::IsVariant)]
pub enum NoteCommand {
    /// Release the note playing on this track.
    NoteOff,
    AllNotesOff,
    /// Silence and reset every module of the slot.
    CleanModules,
    StopPlaying,
    Play,
}

impl NoteCommand {
    pub fn from_note(note: u8) -> Option<NoteCommand> {
        Some(match note {
            128 => NoteCommand::NoteOff,
            129 => NoteCommand::AllNotesOff,
            130 => NoteCommand::CleanModules,
            131 => NoteCommand::StopPlaying,
            132 => NoteCommand::Play,
            _ => return None,
        })
    }

    pub fn note(self) -> u8 {
        match self {
            NoteCommand::NoteOff => 128,
            NoteCommand::AllNotesOff => 129,
            NoteCommand::CleanModules => 130,
            NoteCommand::StopPlaying => 131,
            NoteCommand::Play => 132,
        }
    }
}

/// One pattern cell, or one live event.
///
/// - `note`: 0 is nothing, 1..=127 a pitch, 128 and up a [NoteCommand].
/// - `velocity`: 0 is the default, 1..=129 explicit.
/// - `module`: target module index plus one, 0 for no target.
/// - `ctl`: `0xCCEE`, where `CC` is a controller number plus one and `EE` an effect code.
/// - `ctl_val`: `0xXXYY`, the controller or effect parameter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NoteEvent {
    #[serde(default)]
    pub note: u8,
    #[serde(default)]
    pub velocity: u8,
    #[serde(default)]
    pub module: u16,
    #[serde(default)]
    pub ctl: u16,
    #[serde(default)]
    pub ctl_val: u16,
}

impl NoteEvent {
    pub fn note_on(note: u8, velocity: u8, module: usize) -> Self {
        NoteEvent {
            note,
            velocity,
            module: (module + 1) as u16,
            ..Default::default()
        }
    }

    /// An event that only carries an effect, such as the stop effect used for syncing slots.
    pub fn effect(effect: u8, value: u16) -> Self {
        NoteEvent {
            ctl: effect as u16,
            ctl_val: value,
            ..Default::default()
        }
    }

    /// An event that sets controller `ctl` of `module` to a normalized value.
    pub fn controller(module: usize, ctl: usize, normalized: u16) -> Self {
        NoteEvent {
            module: (module + 1) as u16,
            ctl: ((ctl + 1) << 8) as u16,
            ctl_val: normalized,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == NoteEvent::default()
    }

    pub fn target_module(&self) -> Option<usize> {
        (self.module as usize).checked_sub(1)
    }

    pub fn command(&self) -> Option<NoteCommand> {
        NoteCommand::from_note(self.note)
    }

    /// Controller index addressed by the `CC` byte.
    pub fn controller_index(&self) -> Option<usize> {
        ((self.ctl >> 8) as usize).checked_sub(1)
    }

    pub fn effect_code(&self) -> u8 {
        (self.ctl & 0xFF) as u8
    }

    pub fn effective_velocity(&self) -> u8 {
        if self.velocity == 0 {
            DEFAULT_VELOCITY
        } else {
            self.velocity.min(DEFAULT_VELOCITY)
        }
    }

    pub fn field(&self, field: EventField) -> u16 {
        match field {
            EventField::Note => self.note as u16,
            EventField::Velocity => self.velocity as u16,
            EventField::Module => self.module,
            EventField::Controller => self.ctl,
            EventField::ControllerValue => self.ctl_val,
        }
    }
}

/// Selects a single field of a [NoteEvent].  Column numbers follow field order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EventField {
    Note,
    Velocity,
    Module,
    Controller,
    ControllerValue,
}

impl EventField {
    pub fn from_column(column: u32) -> Option<EventField> {
        Some(match column {
            0 => EventField::Note,
            1 => EventField::Velocity,
            2 => EventField::Module,
            3 => EventField::Controller,
            4 => EventField::ControllerValue,
            _ => return None,
        })
    }
}

/// A partial update of a [NoteEvent]: fields left `None` keep their current value.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct EventPatch {
    pub note: Option<u8>,
    pub velocity: Option<u8>,
    pub module: Option<u16>,
    pub ctl: Option<u16>,
    pub ctl_val: Option<u16>,
}

impl EventPatch {
    /// Build a patch from flat integer fields, where any negative value means "leave as is".
    ///
    /// Non-negative values saturate to the field's width.
    pub fn from_raw(note: i32, velocity: i32, module: i32, ctl: i32, ctl_val: i32) -> Self {
        fn keep_or<T: TryFrom<i32>>(value: i32, max: T) -> Option<T> {
            if value < 0 {
                None
            } else {
                Some(T::try_from(value).unwrap_or(max))
            }
        }

        EventPatch {
            note: keep_or(note, u8::MAX),
            velocity: keep_or(velocity, u8::MAX),
            module: keep_or(module, u16::MAX),
            ctl: keep_or(ctl, u16::MAX),
            ctl_val: keep_or(ctl_val, u16::MAX),
        }
    }

    pub fn apply(&self, event: &mut NoteEvent) {
        if let Some(n) = self.note {
            event.note = n;
        }
        if let Some(v) = self.velocity {
            event.velocity = v;
        }
        if let Some(m) = self.module {
            event.module = m;
        }
        if let Some(c) = self.ctl {
            event.ctl = c;
        }
        if let Some(v) = self.ctl_val {
            event.ctl_val = v;
        }
    }
}

impl From<NoteEvent> for EventPatch {
    fn from(event: NoteEvent) -> Self {
        EventPatch {
            note: Some(event.note),
            velocity: Some(event.velocity),
            module: Some(event.module),
            ctl: Some(event.ctl),
            ctl_val: Some(event.ctl_val),
        }
    }
}

/// Frequency of `note` shifted by `relative_note` semitones and `finetune` 1/256ths of a semitone.
pub fn note_frequency(note: u8, relative_note: i32, finetune: i32) -> f32 {
    let semitones = note as f64 + relative_note as f64 + finetune as f64 / 256.0 - A4_NOTE as f64;
    (440.0 * (semitones / 12.0).exp2()) as f32
}
