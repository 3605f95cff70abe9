//! Timeline layout documents.
//!
//! A layout lists which clips sit on which track at which start frame, plus
//! the effects applied over frame ranges. It is versioned JSON so older
//! documents keep loading.

use reelflow_core::{FrameRange, ReelflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::clip::{Clip, ClipRef};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// A clip placed on a track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipPlacement {
    pub track: usize,
    pub start: i64,
    pub name: String,
    pub source: ClipRef,
    /// Source in point, defaults to the start of the source
    #[serde(default)]
    pub begin: Option<i64>,
    /// Source out point, defaults to the end of the source
    #[serde(default)]
    pub end: Option<i64>,
}

impl ClipPlacement {
    /// Build the clip described by this placement.
    pub fn to_clip(&self) -> Result<Clip> {
        let begin = self.begin.unwrap_or(0);
        let end = self.end.unwrap_or(self.source.frame_count);
        Clip::with_range(self.name.clone(), self.source.clone(), begin, end)
    }
}

/// A filter or mixer applied over a range of timeline frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectPlacement {
    /// Registered effect name
    pub effect: String,
    /// Track the effect belongs to. Filters without a track apply to the
    /// composited output.
    #[serde(default)]
    pub track: Option<usize>,
    pub range: FrameRange,
}

/// Everything needed to rebuild a timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineLayout {
    pub version: u32,
    #[serde(default)]
    pub clips: Vec<ClipPlacement>,
    #[serde(default)]
    pub filters: Vec<EffectPlacement>,
    #[serde(default)]
    pub mixers: Vec<EffectPlacement>,
}

impl Default for TimelineLayout {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            clips: Vec::new(),
            filters: Vec::new(),
            mixers: Vec::new(),
        }
    }
}

impl TimelineLayout {
    /// Serialize to pretty JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| ReelflowError::Serialization(format!("Failed to serialize layout: {}", e)))
    }

    /// Deserialize from JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let layout: Self = serde_json::from_slice(data)
            .map_err(|e| ReelflowError::Serialization(format!("Failed to parse layout: {}", e)))?;
        if layout.version > CURRENT_VERSION {
            return Err(ReelflowError::Serialization(format!(
                "Layout version {} is newer than supported version {}",
                layout.version, CURRENT_VERSION
            )));
        }
        Ok(layout)
    }

    /// Load a layout from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    /// Save a layout to a file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Highest track index referenced by a clip, if any.
    pub fn max_track(&self) -> Option<usize> {
        self.clips.iter().map(|c| c.track).max()
    }

    /// Frame after the last clip ends.
    pub fn length(&self) -> i64 {
        self.clips
            .iter()
            .map(|c| {
                let begin = c.begin.unwrap_or(0);
                let end = c.end.unwrap_or(c.source.frame_count);
                c.start + (end - begin)
            })
            .max()
            .unwrap_or(0)
    }
}
