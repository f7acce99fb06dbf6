mod common;

use pretty_assertions::assert_eq;
use voxslot::*;

use common::*;

fn four_line_song(h: &Harness) {
    let e = &h.engine;
    e.open_slot(0).unwrap();
    let _lock = e.lock(0).unwrap();
    e.new_pattern(0, None, 0, 0, 1, 4, "").unwrap();
}

#[test]
fn song_length_follows_tempo() {
    let h = harness_with(EngineConfig::default());
    four_line_song(&h);
    let e = &h.engine;

    assert_eq!(e.song_bpm(0).unwrap(), 125);
    assert_eq!(e.song_speed(0).unwrap(), 6);
    assert_eq!(e.song_length_lines(0).unwrap(), 4);
    // 5292 frames per line at 44.1 kHz.
    assert_eq!(e.song_length_frames(0).unwrap(), 4 * 5292);

    e.set_song_speed(0, 3).unwrap();
    assert_eq!(e.song_length_frames(0).unwrap(), 4 * 2646);
}

#[test]
fn autostop_ends_the_song() {
    let h = harness_with(EngineConfig::default());
    four_line_song(&h);
    let e = &h.engine;
    assert!(e.autostop(0).unwrap());

    e.play_from_beginning(0).unwrap();
    assert!(!e.end_of_song(0).unwrap());
    h.render(22050);
    assert!(e.end_of_song(0).unwrap());
    assert!(e.transport_state(0).unwrap().is_stopped());
}

#[test]
fn songs_loop_without_autostop() {
    let h = harness_with(EngineConfig::default());
    four_line_song(&h);
    let e = &h.engine;
    e.set_autostop(0, false).unwrap();

    e.play_from_beginning(0).unwrap();
    for _ in 0..4 {
        h.render(22050);
    }
    assert!(!e.end_of_song(0).unwrap());
    assert!(e.current_line(0).unwrap() < 4);
}

#[test]
fn paused_slots_do_not_advance() {
    let h = harness_with(EngineConfig::default());
    four_line_song(&h);
    let e = &h.engine;

    e.play_from_beginning(0).unwrap();
    e.pause(0).unwrap();
    assert!(e.is_suspended(0).unwrap());
    h.render(44100);
    assert!(!e.end_of_song(0).unwrap());

    e.resume(0).unwrap();
    h.render(44100);
    assert!(e.end_of_song(0).unwrap());
}

#[test]
fn rewinding_moves_the_cursor() {
    let h = harness_with(EngineConfig::default());
    four_line_song(&h);
    let e = &h.engine;
    e.rewind(0, 2).unwrap();
    assert_eq!(e.current_line(0).unwrap(), 2);
    assert!(e.transport_state(0).unwrap().is_stopped());
}

#[test]
fn second_stop_silences_modules() {
    let h = harness();
    let gen = h.slot_with_generator(0);
    let e = &h.engine;
    {
        let _lock = e.lock(0).unwrap();
        e.new_pattern(0, None, 0, 0, 1, 64, "").unwrap();
    }
    e.play(0).unwrap();
    e.send_event(0, 0, NoteEvent::note_on(A4_NOTE, 0, gen)).unwrap();
    assert!(first_sound(&h.render(256)).is_some());

    e.stop(0).unwrap();
    assert!(first_sound(&h.render(256)).is_some());
    e.stop(0).unwrap();
    assert_eq!(first_sound(&h.render(256)), None);
}

#[test]
fn volume_is_clamped_and_applied() {
    let h = harness();
    let gen = h.slot_with_generator(0);
    let e = &h.engine;
    assert_eq!(e.set_volume(0, 1000).unwrap(), 256);
    assert_eq!(e.volume(0).unwrap(), 256);
    assert_eq!(e.set_volume(0, 0).unwrap(), 256);

    e.send_event(0, 0, NoteEvent::note_on(A4_NOTE, 0, gen)).unwrap();
    assert_eq!(first_sound(&h.render(256)), None);
    e.set_volume(0, 128).unwrap();
    assert!(first_sound(&h.render(256)).is_some());
}

#[test]
fn song_names() {
    let h = harness();
    h.engine.open_slot(2).unwrap();
    assert_eq!(h.engine.song_name(2).unwrap(), "");
    h.engine.set_song_name(2, "intro").unwrap();
    assert_eq!(h.engine.song_name(2).unwrap(), "intro");
}
