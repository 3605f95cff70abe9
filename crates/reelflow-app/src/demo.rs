//! Built-in timeline used when no layout file is given.

use reelflow_core::FrameRange;
use reelflow_timeline::{ClipPlacement, ClipRef, EffectPlacement, TimelineLayout};

fn placement(track: usize, start: i64, name: &str, frames: i64) -> ClipPlacement {
    ClipPlacement {
        track,
        start,
        name: name.to_string(),
        source: ClipRef::new(format!("{}.mov", name), frames),
        begin: None,
        end: None,
    }
}

/// Two overlapping clips dissolving into each other, a third after a gap,
/// and a grayscale pass over the tail.
pub fn layout() -> TimelineLayout {
    TimelineLayout {
        clips: vec![
            placement(0, 0, "intro", 75),
            placement(1, 50, "interview", 100),
            placement(0, 160, "outro", 40),
        ],
        filters: vec![EffectPlacement {
            effect: "grayscale".to_string(),
            track: None,
            range: FrameRange::open(170),
        }],
        mixers: vec![EffectPlacement {
            effect: "cross_dissolve".to_string(),
            track: Some(1),
            range: FrameRange::new(50, 75),
        }],
        ..TimelineLayout::default()
    }
}
