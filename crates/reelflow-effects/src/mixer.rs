//! Mixers and their per-range lookup.

use reelflow_core::{FrameBuffer, FrameRange, ReelflowError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A two-input video effect.
pub trait MixerInstance: Send + Sync {
    fn name(&self) -> &str;

    fn init(&self, _width: u32, _height: u32) {}

    /// Blend `top` over `bottom` into `output`.
    ///
    /// `progress` runs from 0.0 at the first frame of the mixer's range
    /// towards 1.0 at its last.
    fn process(
        &self,
        time: f64,
        progress: f32,
        bottom: &FrameBuffer,
        top: &FrameBuffer,
        output: &mut FrameBuffer,
    ) -> Result<()>;
}

pub type SharedMixer = Arc<dyn MixerInstance>;

#[derive(Clone)]
pub struct MixerEntry {
    pub mixer: SharedMixer,
    pub range: FrameRange,
}

impl fmt::Debug for MixerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MixerEntry")
            .field("mixer", &self.mixer.name())
            .field("range", &self.range)
            .finish()
    }
}

/// Mixers keyed by their first frame. Ranges never overlap.
#[derive(Clone, Debug, Default)]
pub struct MixerList {
    entries: BTreeMap<i64, MixerEntry>,
}

impl MixerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a mixer to `range`. Fails if another mixer already covers part of it.
    pub fn insert(&mut self, mixer: SharedMixer, range: FrameRange) -> Result<()> {
        if range.is_empty() {
            return Err(ReelflowError::InvalidParameter(format!(
                "mixer range {:?} is empty",
                range
            )));
        }
        if let Some(existing) = self.entries.values().find(|e| e.range.overlaps(range)) {
            return Err(ReelflowError::Effect(format!(
                "{} already mixes frames {:?}",
                existing.mixer.name(),
                existing.range
            )));
        }
        self.entries.insert(range.start, MixerEntry { mixer, range });
        Ok(())
    }

    /// Remove the mixer starting at `start`.
    pub fn remove(&mut self, start: i64) -> Option<MixerEntry> {
        self.entries.remove(&start)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn init(&self, width: u32, height: u32) {
        for entry in self.entries.values() {
            entry.mixer.init(width, height);
        }
    }

    /// The mixer covering `frame`, with its progress.
    pub fn mixer_at(&self, frame: i64) -> Option<(&MixerEntry, f32)> {
        let (_, entry) = self.entries.range(..=frame).next_back()?;
        entry
            .range
            .contains(frame)
            .then(|| (entry, entry.range.progress(frame)))
    }
}
