//! Turns note events into module events, controller writes and transport changes.
//!
//! Pattern cells and live events go through the same path; they differ only in which voice a track maps to.
use crate::graph::ModuleGraph;
use crate::modules::{CtlScaling, ModuleEvent};
use crate::note::{effect, NoteCommand, NoteEvent, FIRST_NOTE_COMMAND};
use crate::time::Ticks;
use crate::transport::Transport;

/// A live event waiting for the render position its timestamp maps to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct TimedEvent {
    pub(crate) tick: Ticks,
    pub(crate) voice: usize,
    pub(crate) event: NoteEvent,
    /// Replaces the event's normalized controller value with one in the controller's own domain.
    pub(crate) raw_ctl_val: Option<i32>,
}

/// What routing an event did that the slot, rather than the graph, must act on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct RouteOutcome {
    /// The event raised a sync pulse.
    pub(crate) sync: bool,
}

pub(crate) fn route(
    graph: &mut ModuleGraph,
    transport: &mut Transport,
    voice: usize,
    event: &NoteEvent,
) -> RouteOutcome {
    route_with_raw(graph, transport, voice, event, None)
}

/// [route], optionally writing the controller with a raw value instead of the event's normalized one.
pub(crate) fn route_with_raw(
    graph: &mut ModuleGraph,
    transport: &mut Transport,
    voice: usize,
    event: &NoteEvent,
    raw_ctl_val: Option<i32>,
) -> RouteOutcome {
    let mut outcome = RouteOutcome::default();
    let target = event.target_module();

    match (event.note, event.command()) {
        (0, _) => {}
        (_, Some(NoteCommand::NoteOff)) => match target {
            Some(m) => graph.send(m, &ModuleEvent::NoteOff { voice }),
            None => graph.broadcast(&ModuleEvent::NoteOff { voice }),
        },
        (_, Some(NoteCommand::AllNotesOff)) => graph.broadcast(&ModuleEvent::AllNotesOff),
        (_, Some(NoteCommand::CleanModules)) => graph.broadcast(&ModuleEvent::Reset),
        (_, Some(NoteCommand::StopPlaying)) => transport.stop(),
        (_, Some(NoteCommand::Play)) => {
            if !transport.is_playing() {
                transport.play();
            }
        }
        (note, None) if note < FIRST_NOTE_COMMAND => {
            if let Some(m) = target {
                graph.note_on(m, voice, note, event.effective_velocity());
            }
        }
        // Unassigned commands.
        (_, None) => {}
    }

    if let (Some(m), Some(ctl)) = (target, event.controller_index()) {
        match raw_ctl_val {
            Some(value) => graph.set_controller(m, ctl, value, CtlScaling::Raw),
            None => graph.set_controller(m, ctl, event.ctl_val as i32, CtlScaling::Normalized),
        }
    }

    match event.effect_code() {
        0 => {}
        effect::SET_SPEED => {
            if event.ctl_val > 0 {
                transport.set_speed(event.ctl_val);
            }
        }
        effect::SET_BPM => {
            if event.ctl_val > 0 {
                transport.set_bpm(event.ctl_val);
            }
        }
        effect::STOP_PLAYING => {
            transport.stop();
            outcome.sync = true;
        }
        effect::JUMP_TO_LINE => transport.jump_after_line(event.ctl_val as i32),
        effect::SYNC => outcome.sync = true,
        other => {
            if let Some(m) = target {
                graph.send(
                    m,
                    &ModuleEvent::Effect {
                        voice,
                        effect: other,
                        value: event.ctl_val,
                    },
                );
            }
        }
    }

    outcome
}
