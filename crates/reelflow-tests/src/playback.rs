//! Frame ordering, end of timeline and transport.

use reelflow_core::Rgba8;
use reelflow_workflow::WorkflowEvent;

use crate::support::{clip, position_painter, workflow, workflow_with_painter};

#[test]
fn hundred_frame_clip_plays_in_order_then_ends() {
    let main = workflow_with_painter(&["clip.mov"], position_painter());
    main.add_clip(clip("clip.mov", 0, 100), 0, 0).unwrap();
    let events = main.subscribe();

    for expected in 0..100 {
        let frame = main
            .get_synchrone_output()
            .unwrap()
            .unwrap_or_else(|| panic!("timeline ended before frame {}", expected));
        assert_eq!(frame.position, Some(expected));
        assert_eq!(frame.pixel(0, 0).r, expected as u8);
    }
    assert!(!main.is_end_reached());

    assert!(main.get_synchrone_output().unwrap().is_none());
    assert!(main.is_end_reached());

    let events: Vec<_> = events.try_iter().collect();
    let rendered = events
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::RenderCompleted { .. }))
        .count();
    let ended = events
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::EndReached))
        .count();
    assert_eq!(rendered, 100);
    assert_eq!(ended, 1);
    assert!(matches!(events.last(), Some(WorkflowEvent::EndReached)));
}

#[test]
fn in_point_offsets_source_frames() {
    let main = workflow_with_painter(&["clip.mov"], position_painter());
    main.add_clip(clip("clip.mov", 40, 60), 2, 10).unwrap();
    main.seek(10).unwrap();
    for source in 40..45 {
        let frame = main.get_synchrone_output().unwrap().unwrap();
        assert_eq!(frame.pixel(3, 3).r, source as u8);
    }
}

#[test]
fn gap_between_clips_is_blank() {
    let main = workflow(&["a.mov", "b.mov"]);
    main.add_clip(clip("a.mov", 0, 3), 0, 0).unwrap();
    main.add_clip(clip("b.mov", 0, 3), 0, 6).unwrap();

    let frames: Vec<_> = (0..9)
        .map(|_| main.get_synchrone_output().unwrap().unwrap())
        .collect();
    for gap in &frames[3..6] {
        assert_eq!(gap.pixel(0, 0), Rgba8::BLACK);
    }
    assert_ne!(frames[2].pixel(0, 0), Rgba8::BLACK);
    assert_ne!(frames[6].pixel(0, 0), Rgba8::BLACK);
    assert!(main.get_synchrone_output().unwrap().is_none());
}

#[test]
fn pause_twice_then_resume() {
    let main = workflow_with_painter(&["clip.mov"], position_painter());
    main.add_clip(clip("clip.mov", 0, 20), 0, 0).unwrap();
    for _ in 0..3 {
        main.get_synchrone_output().unwrap();
    }

    main.pause().unwrap();
    main.pause().unwrap();
    assert!(main.is_paused());
    assert_eq!(main.current_frame(), 3);

    main.unpause();
    main.unpause();
    assert!(!main.is_paused());
    let frame = main.get_synchrone_output().unwrap().unwrap();
    assert_eq!(frame.pixel(0, 0).r, 3);
}

#[test]
fn seeking_backwards_restarts_at_the_right_frame() {
    let main = workflow_with_painter(&["clip.mov"], position_painter());
    main.add_clip(clip("clip.mov", 0, 50), 0, 0).unwrap();
    for _ in 0..10 {
        main.get_synchrone_output().unwrap();
    }
    main.seek(4).unwrap();
    let frame = main.get_synchrone_output().unwrap().unwrap();
    assert_eq!(frame.pixel(0, 0).r, 4);
    main.previous_frame().unwrap();
    main.previous_frame().unwrap();
    let frame = main.get_synchrone_output().unwrap().unwrap();
    assert_eq!(frame.pixel(0, 0).r, 3);
}

#[test]
fn stop_rewinds_and_replays() {
    let main = workflow_with_painter(&["clip.mov"], position_painter());
    main.add_clip(clip("clip.mov", 0, 5), 0, 0).unwrap();
    while main.get_synchrone_output().unwrap().is_some() {}
    main.stop();
    assert_eq!(main.current_frame(), 0);
    assert!(!main.is_end_reached());
    let frame = main.get_synchrone_output().unwrap().unwrap();
    assert_eq!(frame.pixel(0, 0).r, 0);
}
