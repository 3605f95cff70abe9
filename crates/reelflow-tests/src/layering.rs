//! Multi-track compositing.

use reelflow_core::{FrameRange, Rgba8};
use reelflow_effects::{CrossDissolve, Invert};
use reelflow_media::synthetic::source_color;
use std::path::Path;
use std::sync::Arc;

use crate::support::{clip, workflow};

fn color(source: &str) -> Rgba8 {
    source_color(Path::new(source))
}

fn frame_at(main: &reelflow_workflow::MainWorkflow, frame: i64) -> Rgba8 {
    main.seek(frame).unwrap();
    main.get_synchrone_output().unwrap().unwrap().pixel(5, 5)
}

#[test]
fn higher_track_covers_lower_track() {
    let main = workflow(&["low.mov", "high.mov"]);
    main.add_clip(clip("low.mov", 0, 50), 0, 0).unwrap();
    main.add_clip(clip("high.mov", 0, 50), 1, 25).unwrap();
    assert_eq!(main.length(), 75);

    assert_eq!(frame_at(&main, 10), color("low.mov"));
    assert_eq!(frame_at(&main, 30), color("high.mov"));
    assert_eq!(frame_at(&main, 60), color("high.mov"));
}

#[test]
fn mixer_blends_overlap() {
    let main = workflow(&["low.mov", "high.mov"]);
    main.add_clip(clip("low.mov", 0, 50), 0, 0).unwrap();
    main.add_clip(clip("high.mov", 0, 50), 1, 25).unwrap();
    main.add_mixer(1, FrameRange::new(25, 35), Arc::new(CrossDissolve))
        .unwrap();

    let low = color("low.mov");
    let high = color("high.mov");
    let mix = |a: u8, b: u8| (a as f32 * 0.5 + b as f32 * 0.5).round() as u8;

    let px = frame_at(&main, 30);
    assert_eq!(px.r, mix(low.r, high.r));
    assert_eq!(px.g, mix(low.g, high.g));
    assert_eq!(px.b, mix(low.b, high.b));

    // Start of the range shows only the bottom layer, after it only the top.
    assert_eq!(frame_at(&main, 25), low);
    assert_eq!(frame_at(&main, 40), high);
}

#[test]
fn track_filter_only_touches_its_track() {
    let main = workflow(&["low.mov", "high.mov"]);
    main.add_clip(clip("low.mov", 0, 50), 0, 0).unwrap();
    main.add_clip(clip("high.mov", 0, 10), 1, 20).unwrap();
    main.add_filter(Some(0), FrameRange::ALL, Arc::new(Invert))
        .unwrap();

    let low = color("low.mov");
    let inverted = Rgba8::opaque(255 - low.r, 255 - low.g, 255 - low.b);
    assert_eq!(frame_at(&main, 5), inverted);
    assert_eq!(frame_at(&main, 25), color("high.mov"));
}

#[test]
fn global_filter_applies_to_composite() {
    let main = workflow(&["low.mov"]);
    main.add_clip(clip("low.mov", 0, 50), 0, 0).unwrap();
    main.add_filter(None, FrameRange::new(10, 20), Arc::new(Invert))
        .unwrap();

    let low = color("low.mov");
    assert_eq!(frame_at(&main, 5), low);
    assert_eq!(frame_at(&main, 15).r, 255 - low.r);
    assert_eq!(frame_at(&main, 20), low);
}

#[test]
fn clip_moved_between_tracks_changes_stacking() {
    let main = workflow(&["low.mov", "high.mov"]);
    main.add_clip(clip("low.mov", 0, 50), 2, 0).unwrap();
    let high = main.add_clip(clip("high.mov", 0, 50), 3, 0).unwrap();
    assert_eq!(frame_at(&main, 0), color("high.mov"));

    main.clip_moved(high, 3, 1, 0).unwrap();
    assert_eq!(frame_at(&main, 1), color("low.mov"));
}
