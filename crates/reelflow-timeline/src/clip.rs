//! Clip types for the timeline.

use reelflow_core::{FrameRange, ReelflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier of a clip, stable across moves and trims.
pub type ClipId = Uuid;

/// Reference to a media source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRef {
    /// Path to the media file
    pub path: PathBuf,
    /// Number of frames the source provides
    pub frame_count: i64,
}

impl ClipRef {
    pub fn new(path: impl Into<PathBuf>, frame_count: i64) -> Self {
        Self {
            path: path.into(),
            frame_count,
        }
    }
}

/// A clip: a `[begin, end)` window into a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Unique clip ID
    pub id: ClipId,
    /// Clip name (displayed in UI)
    pub name: String,
    /// Reference to source media
    pub source: ClipRef,
    begin: i64,
    end: i64,
}

impl Clip {
    /// Create a clip covering the whole source.
    pub fn new(name: impl Into<String>, source: ClipRef) -> Self {
        let end = source.frame_count.max(0);
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source,
            begin: 0,
            end,
        }
    }

    /// Create a clip covering `[begin, end)` of the source.
    pub fn with_range(name: impl Into<String>, source: ClipRef, begin: i64, end: i64) -> Result<Self> {
        let mut clip = Self::new(name, source);
        clip.set_range(begin, end)?;
        Ok(clip)
    }

    /// Source in point.
    #[inline]
    pub fn begin(&self) -> i64 {
        self.begin
    }

    /// Source out point, exclusive.
    #[inline]
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Frames this clip occupies on a track.
    #[inline]
    pub fn length(&self) -> i64 {
        self.end - self.begin
    }

    /// Source frames played by the clip.
    pub fn source_range(&self) -> FrameRange {
        FrameRange::new(self.begin, self.end)
    }

    /// Change the in and out points. The clip is left untouched on error.
    pub fn set_range(&mut self, begin: i64, end: i64) -> Result<()> {
        if begin < 0 || end <= begin {
            return Err(ReelflowError::InvalidParameter(format!(
                "clip range [{}, {}) is empty or negative",
                begin, end
            )));
        }
        if end > self.source.frame_count {
            return Err(ReelflowError::InvalidParameter(format!(
                "clip out point {} is past the end of {} ({} frames)",
                end,
                self.source.path.display(),
                self.source.frame_count
            )));
        }
        self.begin = begin;
        self.end = end;
        Ok(())
    }
}
