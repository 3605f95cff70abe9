//! Layout documents applied to a workflow.

use reelflow_core::Rgba8;
use reelflow_effects::EffectsEngine;
use reelflow_media::synthetic::source_color;
use reelflow_timeline::TimelineLayout;
use std::path::Path;

use crate::support::workflow;

const LAYOUT: &str = r#"{
    "version": 1,
    "clips": [
        { "track": 0, "start": 0, "name": "a", "source": { "path": "a.mov", "frame_count": 500 }, "end": 20 },
        { "track": 1, "start": 10, "name": "b", "source": { "path": "b.mov", "frame_count": 500 }, "begin": 100, "end": 120 }
    ],
    "filters": [
        { "effect": "invert", "range": { "start": 25, "end": null } }
    ],
    "mixers": [
        { "effect": "dip_to_black", "track": 1, "range": { "start": 10, "end": 16 } }
    ]
}"#;

#[test]
fn layout_builds_timeline_and_effects() {
    let layout = TimelineLayout::from_json(LAYOUT.as_bytes()).unwrap();
    let main = workflow(&["a.mov", "b.mov"]);
    main.apply_layout(&layout, &EffectsEngine::with_builtins())
        .unwrap();

    assert_eq!(main.length(), 30);
    assert_eq!(main.clips(0).unwrap().len(), 1);
    let (start, b) = main.clips(1).unwrap().remove(0);
    assert_eq!((start, b.begin(), b.end()), (10, 100, 120));

    let a = source_color(Path::new("a.mov"));
    let b = source_color(Path::new("b.mov"));
    main.seek(5).unwrap();
    assert_eq!(main.get_synchrone_output().unwrap().unwrap().pixel(0, 0), a);
    main.seek(20).unwrap();
    assert_eq!(main.get_synchrone_output().unwrap().unwrap().pixel(0, 0), b);
    main.seek(26).unwrap();
    let inverted = main.get_synchrone_output().unwrap().unwrap().pixel(0, 0);
    assert_eq!(inverted, Rgba8::opaque(255 - b.r, 255 - b.g, 255 - b.b));
}

#[test]
fn unknown_effect_is_reported() {
    let mut layout = TimelineLayout::from_json(LAYOUT.as_bytes()).unwrap();
    layout.filters[0].effect = "sepia".to_string();
    let main = workflow(&["a.mov", "b.mov"]);
    assert!(main
        .apply_layout(&layout, &EffectsEngine::with_builtins())
        .is_err());

    // Nothing from the rejected layout was placed.
    assert_eq!(main.length(), 0);
    for track in 0..main.track_count() {
        assert!(main.clips(track).unwrap().is_empty());
    }
    assert!(main.get_synchrone_output().unwrap().is_none());
}
