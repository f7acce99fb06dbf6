mod common;

use pretty_assertions::assert_eq;
use voxslot::*;

use common::*;

fn build_song(h: &Harness) -> (usize, usize) {
    let gen = h.slot_with_generator(0);
    let e = &h.engine;
    let _lock = e.lock(0).unwrap();
    e.set_song_name(0, "demo").unwrap();
    e.set_song_bpm(0, 140).unwrap();
    let amp = e.new_module(0, "Amplifier", "amp", 10, 20, 0).unwrap();
    e.disconnect_module(0, gen, OUTPUT_MODULE).unwrap();
    e.connect_module(0, gen, amp).unwrap();
    e.connect_module(0, amp, OUTPUT_MODULE).unwrap();
    e.set_module_color(0, amp, 0x123456).unwrap();

    let p = e.new_pattern(0, None, 0, 0, 2, 8, "verse").unwrap();
    e.set_pattern_event(0, p, 0, 0, EventPatch::from(NoteEvent::note_on(A4_NOTE, 0, gen)))
        .unwrap();
    e.set_pattern_event(0, p, 1, 4, EventPatch::from(NoteEvent::effect(effect::SET_BPM, 90)))
        .unwrap();
    (gen, p)
}

#[test]
fn saved_projects_load_into_other_slots() {
    let h = harness();
    let (gen, p) = build_song(&h);
    let e = &h.engine;

    let bytes = e.save_project_to_memory(0).unwrap();
    e.open_slot(1).unwrap();
    e.load_project_from_memory(1, &bytes).unwrap();

    assert_eq!(e.song_name(1).unwrap(), "demo");
    assert_eq!(e.song_bpm(1).unwrap(), 140);
    assert_eq!(e.number_of_modules(1).unwrap(), e.number_of_modules(0).unwrap());
    assert_eq!(e.module_info(1, gen).unwrap(), e.module_info(0, gen).unwrap());
    let amp = e.find_module(1, "amp").unwrap().unwrap();
    assert_eq!(e.module_color(1, amp).unwrap(), 0x123456);
    assert_eq!(e.module_inputs(1, OUTPUT_MODULE).unwrap(), vec![amp]);
    assert_eq!(e.pattern_data(1, p).unwrap(), e.pattern_data(0, p).unwrap());
    assert!(e.transport_state(1).unwrap().is_stopped());
}

#[test]
fn projects_round_trip_through_files() -> anyhow::Result<()> {
    let h = harness();
    build_song(&h);
    let e = &h.engine;

    let path = std::env::temp_dir().join(format!("voxslot-test-{}.json", std::process::id()));
    e.save_project(0, &path)?;
    e.open_slot(5)?;
    e.load_project(5, &path)?;
    std::fs::remove_file(&path)?;

    assert_eq!(e.song_name(5)?, "demo");
    assert_eq!(e.find_pattern(5, "verse")?, Some(0));
    Ok(())
}

#[test]
fn failed_loads_leave_the_slot_alone() {
    let h = harness();
    build_song(&h);
    let e = &h.engine;

    let before = e.number_of_modules(0).unwrap();
    let err = e.load_project_from_memory(0, b"{ not a project").unwrap_err();
    assert!(err.is_load_failure());
    assert!(e
        .load_project_from_memory(0, br#"{"format": "something-else", "version": 1}"#)
        .unwrap_err()
        .is_load_failure());
    assert!(e.load_project(0, "/nonexistent/voxslot/project.json").unwrap_err().is_load_failure());

    assert_eq!(e.number_of_modules(0).unwrap(), before);
    assert_eq!(e.song_name(0).unwrap(), "demo");
}

#[test]
fn loaded_songs_play() {
    let h = harness();
    build_song(&h);
    let e = &h.engine;
    let bytes = e.save_project_to_memory(0).unwrap();
    e.close_slot(0).unwrap();

    e.open_slot(3).unwrap();
    e.load_project_from_memory(3, &bytes).unwrap();
    e.play_from_beginning(3).unwrap();
    assert!(first_sound(&h.render(1024)).is_some());
}

#[test]
fn graph_edits() {
    let h = harness();
    let gen = h.slot_with_generator(0);
    let e = &h.engine;
    let _lock = e.lock(0).unwrap();

    assert_eq!(e.module_type(0, OUTPUT_MODULE).unwrap(), "Output");
    assert_eq!(e.module_type(0, gen).unwrap(), "Generator");
    assert_eq!(e.module_outputs(0, gen).unwrap(), vec![OUTPUT_MODULE]);
    assert!(e.remove_module(0, OUTPUT_MODULE).unwrap_err().is_invalid_handle());
    assert!(e.new_module(0, "Theremin", "", 0, 0, 0).unwrap_err().is_unknown_module_type());

    e.set_module_position(0, gen, Position { x: 1, y: 2, z: 3 }).unwrap();
    assert_eq!(e.module_position(0, gen).unwrap(), Position { x: 1, y: 2, z: 3 });
    e.set_module_relative_note(0, gen, -12).unwrap();
    assert_eq!(e.module_relative_note(0, gen).unwrap(), -12);

    let info: ModuleInfo = e.module_info(0, gen).unwrap();
    assert_eq!((info.type_name, info.relative_note), ("Generator", -12));
    assert_eq!(info.outputs, vec![OUTPUT_MODULE]);

    e.remove_module(0, gen).unwrap();
    assert!(e.module_inputs(0, OUTPUT_MODULE).unwrap().is_empty());
    assert!(e.module_name(0, gen).unwrap_err().is_invalid_handle());
}

#[test]
fn muted_modules_are_silent() {
    let h = harness();
    let gen = h.slot_with_generator(0);
    let e = &h.engine;
    {
        let _lock = e.lock(0).unwrap();
        e.set_module_mute(0, gen, true).unwrap();
    }
    assert!(e.module_flags(0, gen).unwrap().mute);

    e.send_event(0, 0, NoteEvent::note_on(A4_NOTE, 0, gen)).unwrap();
    assert_eq!(first_sound(&h.render(256)), None);
}

#[test]
fn slots_are_isolated() {
    let h = harness();
    build_song(&h);
    let e = &h.engine;
    e.open_slot(1).unwrap();
    {
        let _lock = e.lock(1).unwrap();
        e.new_module(1, "Amplifier", "other", 0, 0, 0).unwrap();
        e.new_pattern(1, None, 0, 0, 1, 4, "other").unwrap();
    }
    let before = e.save_project_to_memory(1).unwrap();

    {
        let _lock = e.lock(0).unwrap();
        let m = e.new_module(0, "Sampler", "s", 0, 0, 0).unwrap();
        e.connect_module(0, m, OUTPUT_MODULE).unwrap();
        e.remove_module(0, m).unwrap();
        let p = e.new_pattern(0, None, 32, 1, 4, 4, "x").unwrap();
        e.resize_pattern(0, p, Some(8), Some(8)).unwrap();
        e.remove_pattern(0, p).unwrap();
        e.set_song_name(0, "changed").unwrap();
    }
    e.play_from_beginning(0).unwrap();
    h.render(2048);
    e.stop(0).unwrap();

    assert_eq!(e.save_project_to_memory(1).unwrap(), before);
    assert!(e.transport_state(1).unwrap().is_stopped());
}

#[test]
fn removing_a_linked_module_keeps_rendering() {
    let h = harness();
    let (gen, _) = build_song(&h);
    let e = &h.engine;
    let amp = e.find_module(0, "amp").unwrap().unwrap();
    {
        let _lock = e.lock(0).unwrap();
        e.remove_module(0, amp).unwrap();
    }
    assert!(e.module_outputs(0, gen).unwrap().is_empty());
    assert!(e.module_inputs(0, OUTPUT_MODULE).unwrap().is_empty());

    e.play_from_beginning(0).unwrap();
    assert_eq!(first_sound(&h.render(2048)), None);
}

#[test]
fn out_of_range_pattern_indices_are_rejected() {
    let h = harness();
    build_song(&h);
    let e = &h.engine;

    for index in [usize::MAX, 1 << 40, voxslot::config::MAX_PATTERNS] {
        let doc = format!(
            r#"{{"format":"voxslot-project","version":1,"patterns":[{{"index":{index},"tracks":1,"lines":4}}]}}"#
        );
        let err = e.load_project_from_memory(0, doc.as_bytes()).unwrap_err();
        assert!(err.is_load_failure(), "{index}: {err}");
    }
    assert_eq!(e.song_name(0).unwrap(), "demo");
    assert_eq!(e.find_pattern(0, "verse").unwrap(), Some(0));
}
