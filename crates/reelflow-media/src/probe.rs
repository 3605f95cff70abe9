//! Media metadata.

use reelflow_core::FrameRate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Information about a media source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaProbe {
    /// Source path
    pub path: PathBuf,
    /// Number of video frames
    pub frame_count: i64,
    pub frame_rate: FrameRate,
    /// Native dimensions, before scaling to the session format
    pub width: u32,
    pub height: u32,
}

impl MediaProbe {
    pub fn new(path: impl Into<PathBuf>, frame_count: i64, frame_rate: FrameRate) -> Self {
        Self {
            path: path.into(),
            frame_count,
            frame_rate,
            width: reelflow_core::defaults::VIDEO_WIDTH,
            height: reelflow_core::defaults::VIDEO_HEIGHT,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frame_rate.frame_time(self.frame_count)
    }
}
