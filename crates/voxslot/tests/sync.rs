mod common;

use pretty_assertions::assert_eq;
use voxslot::*;

use common::*;

/// Slot 0 plays an empty song with a stop effect at line 2.  At speed 1 a line is 1000 frames, so the pulse is at
/// frame 2000.
fn leader(h: &Harness) {
    let e = &h.engine;
    e.open_slot(0).unwrap();
    let _lock = e.lock(0).unwrap();
    e.set_song_speed(0, 1).unwrap();
    let p = e.new_pattern(0, None, 0, 0, 1, 4, "leader").unwrap();
    e.set_pattern_event(
        0,
        p,
        0,
        2,
        EventPatch::from(NoteEvent::effect(effect::STOP_PLAYING, 0)),
    )
    .unwrap();
}

/// A slot playing a note on line 0 of its song.
fn follower(h: &Harness, slot: usize) {
    let gen = h.slot_with_generator(slot);
    let e = &h.engine;
    let _lock = e.lock(slot).unwrap();
    let p = e.new_pattern(slot, None, 0, 0, 1, 64, "follower").unwrap();
    e.set_pattern_event(
        slot,
        p,
        0,
        0,
        EventPatch::from(NoteEvent::note_on(A4_NOTE, 0, gen)),
    )
    .unwrap();
}

#[test]
fn armed_slots_start_on_the_pulse() {
    let h = harness();
    leader(&h);
    follower(&h, 1);
    let e = &h.engine;

    e.pause(1).unwrap();
    e.play_from_beginning(1).unwrap();
    e.sync_resume(1).unwrap();
    e.play_from_beginning(0).unwrap();

    let out = h.render(4096);
    assert_eq!(first_sound(&out), Some(2000));
    assert!(e.end_of_song(0).unwrap());
    assert!(!e.is_suspended(1).unwrap());
    assert!(!e.end_of_song(1).unwrap());
}

#[test]
fn unarmed_paused_slots_stay_paused() {
    let h = harness();
    leader(&h);
    follower(&h, 1);
    let e = &h.engine;

    e.pause(1).unwrap();
    e.play_from_beginning(1).unwrap();
    e.play_from_beginning(0).unwrap();

    assert_eq!(first_sound(&h.render(4096)), None);
    assert!(e.is_suspended(1).unwrap());
}

#[test]
fn the_pulse_crosses_render_calls() {
    let h = harness();
    leader(&h);
    follower(&h, 1);
    let e = &h.engine;

    e.pause(1).unwrap();
    e.play_from_beginning(1).unwrap();
    e.sync_resume(1).unwrap();
    e.play_from_beginning(0).unwrap();

    let mut out = vec![];
    for _ in 0..8 {
        out.extend(h.render(500));
    }
    assert_eq!(first_sound(&out), Some(2000));
}

#[test]
fn live_stop_effects_pulse_too() {
    let h = harness();
    h.engine.open_slot(0).unwrap();
    follower(&h, 1);
    let e = &h.engine;

    e.pause(1).unwrap();
    e.play_from_beginning(1).unwrap();
    e.sync_resume(1).unwrap();

    e.set_event_timestamp(0, Some(Ticks(300 * TICKS_PER_FRAME))).unwrap();
    e.send_event(0, 0, NoteEvent::effect(effect::STOP_PLAYING, 0)).unwrap();

    assert_eq!(first_sound(&h.render(1024)), Some(300));
}

#[test]
fn resume_disarms() {
    let h = harness();
    leader(&h);
    follower(&h, 1);
    let e = &h.engine;

    e.pause(1).unwrap();
    e.sync_resume(1).unwrap();
    e.resume(1).unwrap();
    e.pause(1).unwrap();
    e.play_from_beginning(0).unwrap();

    h.render(4096);
    assert!(e.is_suspended(1).unwrap());
}

#[test]
fn stop_written_under_lock_releases_the_follower() {
    let h = harness();
    let e = &h.engine;
    e.open_slot(0).unwrap();
    let sync = {
        let _lock = e.lock(0).unwrap();
        e.set_song_speed(0, 1).unwrap();
        e.new_pattern(0, None, 0, 0, 1, 16, "SYNC").unwrap()
    };
    follower(&h, 1);
    e.pause(1).unwrap();
    e.play_from_beginning(1).unwrap();

    e.play_from_beginning(0).unwrap();
    assert_eq!(first_sound(&h.render(1500)), None);

    {
        let _lock = e.lock(0).unwrap();
        e.set_pattern_event(
            0,
            sync,
            0,
            3,
            EventPatch::from(NoteEvent::effect(effect::STOP_PLAYING, 0)),
        )
        .unwrap();
        e.sync_resume(1).unwrap();
    }

    // Line 3 starts 3000 frames into the song, 1500 frames into this block.
    assert_eq!(first_sound(&h.render(4096)), Some(1500));
    assert!(!e.is_suspended(1).unwrap());
}
